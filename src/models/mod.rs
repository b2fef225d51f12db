//! Core data models: citations, references, verification results and findings.

mod citation;
mod findings;
mod reference;
mod verification;

pub use citation::{Citation, MalformedMarker, Occurrence};
pub use findings::{ConsistencyIssue, IssueKind, RelevanceJudgment, Verdict};
pub use reference::{Field, Reference, ReferenceFields, ReferenceType};
pub use verification::{
    Candidate, Evidence, EvidenceSource, VerificationFailure, VerificationResult,
    VerificationStatus,
};
