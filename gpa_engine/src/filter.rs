//! Fixed filter structs carried by trigger messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scope of a score recompute run. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecomputeFilter {
    /// Restrict to one term.
    pub term_id: Option<String>,
    /// Restrict to one program.
    pub program_id: Option<String>,
    /// Restrict to one school.
    pub school_id: Option<String>,
}

/// Scope of a rank-only recompute run. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankFilter {
    /// Restrict to one grade.
    pub grade_id: Option<String>,
    /// Restrict to one program.
    pub program_id: Option<String>,
    /// Restrict to one school.
    pub school_id: Option<String>,
    /// Restrict to the cohorts this student belongs to.
    pub student_id: Option<String>,
}

/// Blank strings are treated as "not set".
fn normalized(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl RecomputeFilter {
    /// Trim values and drop blank ones.
    pub fn normalize(self) -> Self {
        Self {
            term_id: normalized(self.term_id),
            program_id: normalized(self.program_id),
            school_id: normalized(self.school_id),
        }
    }
}

impl RankFilter {
    /// Trim values and drop blank ones.
    pub fn normalize(self) -> Self {
        Self {
            grade_id: normalized(self.grade_id),
            program_id: normalized(self.program_id),
            school_id: normalized(self.school_id),
            student_id: normalized(self.student_id),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[(&str, &Option<String>)]) -> fmt::Result {
    let mut wrote = false;
    for (name, value) in fields {
        if let Some(v) = value {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "{name}={v}")?;
            wrote = true;
        }
    }
    if !wrote {
        write!(f, "all")?;
    }
    Ok(())
}

impl fmt::Display for RecomputeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(
            f,
            &[
                ("term", &self.term_id),
                ("program", &self.program_id),
                ("school", &self.school_id),
            ],
        )
    }
}

impl fmt::Display for RankFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(
            f,
            &[
                ("grade", &self.grade_id),
                ("program", &self.program_id),
                ("school", &self.school_id),
                ("student", &self.student_id),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_set_fields() {
        let f = RecomputeFilter {
            term_id: Some("T1".into()),
            program_id: None,
            school_id: Some("S1".into()),
        };
        assert_eq!(f.to_string(), "term=T1 school=S1");
        assert_eq!(RankFilter::default().to_string(), "all");
    }

    #[test]
    fn normalize_drops_blank_values() {
        let f = RankFilter {
            grade_id: Some("  ".into()),
            program_id: Some(" P1 ".into()),
            school_id: None,
            student_id: Some(String::new()),
        }
        .normalize();
        assert_eq!(
            f,
            RankFilter {
                program_id: Some("P1".into()),
                ..Default::default()
            }
        );
    }
}
