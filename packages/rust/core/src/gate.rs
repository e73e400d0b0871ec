//! Decision hooks consulted before a candidate is persisted.
//!
//! A gate is the extension point for conditional persistence rules. It is
//! a plain predicate over the record, so the decision is deterministic and
//! testable.

use sourcing_shared::CandidateRecord;

/// Verdict of a gate for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Skip { reason: String },
}

impl Decision {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }
}

/// Decides whether a candidate enters persistence.
pub trait CandidateGate: Send + Sync {
    fn admit(&self, candidate: &CandidateRecord) -> Decision;
}

impl<F> CandidateGate for F
where
    F: Fn(&CandidateRecord) -> Decision + Send + Sync,
{
    fn admit(&self, candidate: &CandidateRecord) -> Decision {
        self(candidate)
    }
}

/// Default gate: every candidate is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl CandidateGate for AdmitAll {
    fn admit(&self, _candidate: &CandidateRecord) -> Decision {
        Decision::Proceed
    }
}

/// Skips candidates whose stated experience is below `years`.
///
/// Candidates without a parseable number in `experience` are skipped too.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimumExperience {
    pub years: f32,
}

impl MinimumExperience {
    pub fn new(years: f32) -> Self {
        Self { years }
    }
}

impl CandidateGate for MinimumExperience {
    fn admit(&self, candidate: &CandidateRecord) -> Decision {
        match candidate.experience.as_deref().and_then(leading_years) {
            Some(years) if years >= self.years => Decision::Proceed,
            Some(years) => Decision::skip(format!(
                "experience {years} years below minimum {}",
                self.years
            )),
            None => Decision::skip("experience not stated"),
        }
    }
}

/// First number in free text: `"6 years"` → 6, `"about 3.5 yrs"` → 3.5.
fn leading_years(text: &str) -> Option<f32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_experience(experience: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            id: "c1".into(),
            name: "Ada".into(),
            title: "Engineer".into(),
            skills: vec![],
            source_ref: None,
            experience: experience.map(String::from),
        }
    }

    #[test]
    fn parses_leading_number() {
        assert_eq!(leading_years("6 years"), Some(6.0));
        assert_eq!(leading_years("about 3.5 yrs."), Some(3.5));
        assert_eq!(leading_years("10+"), Some(10.0));
        assert_eq!(leading_years("senior"), None);
    }

    #[test]
    fn minimum_experience_gate() {
        let gate = MinimumExperience::new(5.0);
        assert_eq!(gate.admit(&with_experience(Some("6 years"))), Decision::Proceed);
        assert!(matches!(
            gate.admit(&with_experience(Some("2 years"))),
            Decision::Skip { .. }
        ));
        assert_eq!(
            gate.admit(&with_experience(None)),
            Decision::skip("experience not stated")
        );
    }

    #[test]
    fn closures_are_gates() {
        let gate = |c: &CandidateRecord| {
            if c.name.starts_with('A') {
                Decision::Proceed
            } else {
                Decision::skip("not an A")
            }
        };
        assert_eq!(gate.admit(&with_experience(None)), Decision::Proceed);
        assert_eq!(AdmitAll.admit(&with_experience(None)), Decision::Proceed);
    }
}
