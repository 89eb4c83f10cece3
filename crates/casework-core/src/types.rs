use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CaseworkError;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    EvidenceIntake,
    InitialAnalysis,
    CrossValidation,
    Synthesis,
    HypothesisFormation,
    TeamReview,
    FinalAssessment,
    ArchivalCommit,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::EvidenceIntake,
            Stage::InitialAnalysis,
            Stage::CrossValidation,
            Stage::Synthesis,
            Stage::HypothesisFormation,
            Stage::TeamReview,
            Stage::FinalAssessment,
            Stage::ArchivalCommit,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next stage in canonical (full) order, ignoring the investigation variant.
    pub fn next(self) -> Option<Stage> {
        Stage::all().get(self.index() + 1).copied()
    }

    /// Stages that only the rapid variant may bypass.
    pub fn is_critical(self) -> bool {
        matches!(self, Stage::CrossValidation | Stage::TeamReview)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::EvidenceIntake => "evidence_intake",
            Stage::InitialAnalysis => "initial_analysis",
            Stage::CrossValidation => "cross_validation",
            Stage::Synthesis => "synthesis",
            Stage::HypothesisFormation => "hypothesis_formation",
            Stage::TeamReview => "team_review",
            Stage::FinalAssessment => "final_assessment",
            Stage::ArchivalCommit => "archival_commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = CaseworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CaseworkError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// InvestigationVariant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationVariant {
    Rapid,
    #[default]
    Standard,
    Comprehensive,
}

impl InvestigationVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            InvestigationVariant::Rapid => "rapid",
            InvestigationVariant::Standard => "standard",
            InvestigationVariant::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for InvestigationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvestigationVariant {
    type Err = CaseworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rapid" => Ok(InvestigationVariant::Rapid),
            "standard" => Ok(InvestigationVariant::Standard),
            "comprehensive" => Ok(InvestigationVariant::Comprehensive),
            _ => Err(CaseworkError::InvalidVariant(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityGate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGate {
    Basic,
    Standard,
    Rigorous,
}

impl QualityGate {
    pub fn threshold(self) -> f64 {
        match self {
            QualityGate::Basic => 60.0,
            QualityGate::Standard => 80.0,
            QualityGate::Rigorous => 95.0,
        }
    }
}

impl fmt::Display for QualityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityGate::Basic => "basic",
            QualityGate::Standard => "standard",
            QualityGate::Rigorous => "rigorous",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Specialist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialist {
    Strategist,
    Forensic,
    Behavioral,
    Tactical,
    Coordinator,
}

impl Specialist {
    pub fn all() -> &'static [Specialist] {
        &[
            Specialist::Strategist,
            Specialist::Forensic,
            Specialist::Behavioral,
            Specialist::Tactical,
            Specialist::Coordinator,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Specialist::Strategist => "strategist",
            Specialist::Forensic => "forensic",
            Specialist::Behavioral => "behavioral",
            Specialist::Tactical => "tactical",
            Specialist::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for Specialist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Specialist {
    type Err = CaseworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Specialist::all()
            .iter()
            .copied()
            .find(|sp| sp.as_str() == s)
            .ok_or_else(|| CaseworkError::UnknownSpecialist(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stage_ordering() {
        assert!(Stage::EvidenceIntake < Stage::InitialAnalysis);
        assert!(Stage::TeamReview > Stage::CrossValidation);
        assert!(Stage::ArchivalCommit > Stage::FinalAssessment);
    }

    #[test]
    fn stage_next() {
        assert_eq!(Stage::EvidenceIntake.next(), Some(Stage::InitialAnalysis));
        assert_eq!(Stage::FinalAssessment.next(), Some(Stage::ArchivalCommit));
        assert_eq!(Stage::ArchivalCommit.next(), None);
    }

    #[test]
    fn stage_parse() {
        for stage in Stage::all() {
            assert_eq!(Stage::from_str(stage.as_str()).unwrap(), *stage);
        }
        assert!(Stage::from_str("delegation").is_err());
    }

    #[test]
    fn critical_stages() {
        let critical: Vec<_> = Stage::all().iter().filter(|s| s.is_critical()).collect();
        assert_eq!(critical, vec![&Stage::CrossValidation, &Stage::TeamReview]);
    }

    #[test]
    fn quality_gate_thresholds() {
        assert_eq!(QualityGate::Basic.threshold(), 60.0);
        assert_eq!(QualityGate::Standard.threshold(), 80.0);
        assert_eq!(QualityGate::Rigorous.threshold(), 95.0);
    }

    #[test]
    fn specialist_parse_rejects_unknown() {
        assert_eq!(Specialist::from_str("forensic").unwrap(), Specialist::Forensic);
        assert!(matches!(
            Specialist::from_str("astrologer"),
            Err(CaseworkError::UnknownSpecialist(_))
        ));
    }

    #[test]
    fn variant_serde_names() {
        let json = serde_json::to_string(&InvestigationVariant::Comprehensive).unwrap();
        assert_eq!(json, "\"comprehensive\"");
        assert_eq!(InvestigationVariant::default(), InvestigationVariant::Standard);
    }
}
