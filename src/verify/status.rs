//! Turning method reports into a single verification result.

use crate::models::{Evidence, VerificationFailure, VerificationResult, VerificationStatus};
use crate::verify::strategy::{MethodOutcome, MethodReport, NotFoundReason};

/// Status implied by a set of method outcomes
///
/// Any confirmation wins; otherwise a conclusive negative makes the entry
/// invalid; otherwise near-miss candidates make it suspicious.
pub fn derive_status(reports: &[MethodReport]) -> VerificationStatus {
    let outcomes = || reports.iter().map(|r| &r.outcome);

    if outcomes().any(|o| matches!(o, MethodOutcome::Confirmed { .. })) {
        VerificationStatus::Verified
    } else if outcomes().any(|o| {
        matches!(
            o,
            MethodOutcome::NotFound(NotFoundReason::Nonexistent)
                | MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier)
        )
    }) {
        VerificationStatus::Invalid
    } else if outcomes().any(|o| {
        matches!(o, MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates, .. }) if *candidates > 0)
    }) {
        VerificationStatus::Suspicious
    } else {
        VerificationStatus::Unverified
    }
}

/// Build the final result for one reference
pub fn finalize(reference_index: u32, reports: &[MethodReport]) -> VerificationResult {
    let failures: Vec<VerificationFailure> = reports
        .iter()
        .flat_map(|report| {
            let inconclusive = match &report.outcome {
                MethodOutcome::Inconclusive(reason) => Some(VerificationFailure::Inconclusive {
                    method: report.method.to_string(),
                    reason: reason.clone(),
                }),
                _ => None,
            };
            report.failures.iter().cloned().chain(inconclusive)
        })
        .collect();

    let notes: Vec<String> = reports.iter().map(MethodReport::describe).collect();

    if reports.is_empty() {
        return VerificationResult::not_checked(reference_index, "no verification method applies");
    }

    if reports
        .iter()
        .all(|r| matches!(r.outcome, MethodOutcome::Inconclusive(_)))
    {
        let mut result = VerificationResult::not_checked(reference_index, "could not be checked");
        result.notes.extend(notes);
        result.failures = failures;
        return result;
    }

    let mut evidence = Vec::new();
    let mut retrieved_summary = None;

    for report in reports {
        match &report.outcome {
            MethodOutcome::Confirmed { evidence: found, summary } => {
                evidence.push(found.clone());
                if retrieved_summary.is_none() {
                    retrieved_summary = summary.clone();
                }
            }
            MethodOutcome::NotFound(NotFoundReason::Nonexistent)
            | MethodOutcome::NotFound(NotFoundReason::MalformedIdentifier) => {
                evidence.push(Evidence::negative(report.source));
            }
            MethodOutcome::NotFound(NotFoundReason::NoMatch { candidates, best_score }) if *candidates > 0 => {
                evidence.push(Evidence::new(report.source, None, *best_score));
            }
            _ => {}
        }
    }

    VerificationResult {
        reference_index,
        status: derive_status(reports),
        evidence,
        retrieved_summary,
        checked: true,
        notes,
        failures,
    }
}

/// Merge a fresh result into a cached one when re-verifying
///
/// A cached `verified` result survives a refresh unless the fresh run found
/// contradicting evidence; a fresh run that merely could not confirm it
/// (network down, ambiguous search) does not downgrade it.
pub fn reconcile(cached: VerificationResult, fresh: VerificationResult) -> VerificationResult {
    let conclusive = matches!(
        fresh.status,
        VerificationStatus::Invalid | VerificationStatus::Suspicious | VerificationStatus::Verified
    );

    if cached.is_verified() && !conclusive {
        tracing::debug!(
            "Keeping cached verified result for reference {}",
            cached.reference_index
        );
        cached
    } else {
        fresh
    }
}
