//! Configuration file support for the scoring engine
//!
//! Loads cohort-level scoring configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.chimerismrc.json` in the working directory
//! 3. `chimerism.config.json` in the working directory
//!
//! All fields are optional. Missing fields keep their clinical defaults.

use crate::grid::{CanonicalGrid, TimeSlot};
use crate::risk::{AlarmThresholds, BlendWeights, KmrWeights, LabWeights};
use crate::scoring::{ClinicalThresholds, GfrThresholds, KmrThresholds, KreThresholds};
use crate::ScoringParams;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound accepted for any single weight
const MAX_WEIGHT: f64 = 10.0;

/// Scoring configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChimerismConfig {
    /// Glob patterns for patient ids to score (default: all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for patient ids to skip
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Weights of the five KMR sub-scores
    #[serde(default)]
    pub kmr_weights: Option<KmrWeightConfig>,

    /// Weights of the lab level and trend components
    #[serde(default)]
    pub lab_weights: Option<LabWeightConfig>,

    /// KMR / lab blend for the overall risk
    #[serde(default)]
    pub blend: Option<BlendConfig>,

    /// Clinical thresholds per marker
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,

    /// Alarm level boundaries on the 0-100 risk scale
    #[serde(default)]
    pub alarm: Option<AlarmConfig>,

    /// Replacement canonical grid (default: 21-slot follow-up calendar)
    #[serde(default)]
    pub grid: Option<Vec<GridSlotConfig>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KmrWeightConfig {
    /// (default: 0.35)
    pub level: Option<f64>,
    /// (default: 0.25)
    pub trend: Option<f64>,
    /// (default: 0.10)
    pub volatility: Option<f64>,
    /// (default: 0.15)
    pub anomaly: Option<f64>,
    /// (default: 0.15)
    pub residual: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabWeightConfig {
    /// (default: 0.6)
    pub level: Option<f64>,
    /// (default: 0.4)
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlendConfig {
    /// (default: 0.65)
    pub kmr: Option<f64>,
    /// (default: 0.35)
    pub lab: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub kmr: Option<KmrThresholdConfig>,
    #[serde(default)]
    pub kre: Option<KreThresholdConfig>,
    #[serde(default)]
    pub gfr: Option<GfrThresholdConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KmrThresholdConfig {
    /// (default: 0.5)
    pub normal_upper: Option<f64>,
    /// (default: 2.0)
    pub dikkat_upper: Option<f64>,
    /// (default: 5.0)
    pub kritik_upper: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KreThresholdConfig {
    /// (default: 1.2)
    pub very_good_lt: Option<f64>,
    /// (default: 4.5)
    pub very_bad_gt: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GfrThresholdConfig {
    /// (default: 90)
    pub very_good_ge: Option<f64>,
    /// (default: 15)
    pub very_bad_le: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmConfig {
    /// (default: 30)
    pub dikkat: Option<f64>,
    /// (default: 60)
    pub kritik: Option<f64>,
    /// (default: 80)
    pub cok_kritik: Option<f64>,
}

/// One slot of a custom grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSlotConfig {
    pub key: String,
    pub order: u32,
    pub pseudo_days: u32,
    #[serde(default)]
    pub kmr: bool,
    #[serde(default)]
    pub lab: bool,
}

/// Resolved configuration with compiled patterns and a built grid
#[derive(Debug)]
pub struct ResolvedConfig {
    /// Compiled include patterns (None means include all)
    pub include: Option<GlobSet>,
    /// Compiled exclude patterns
    pub exclude: GlobSet,
    pub params: ScoringParams,
    pub grid: CanonicalGrid,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn check_weight(section: &str, name: &str, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        if v < 0.0 {
            anyhow::bail!("{}.{} must be non-negative (got {})", section, name, v);
        }
        if v > MAX_WEIGHT {
            anyhow::bail!("{}.{} must be at most {} (got {})", section, name, MAX_WEIGHT, v);
        }
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value <= 0.0 {
        anyhow::bail!("{} must be positive (got {})", name, value);
    }
    Ok(())
}

fn check_ascending(lower_name: &str, lower: f64, upper_name: &str, upper: f64) -> Result<()> {
    if lower >= upper {
        anyhow::bail!(
            "{} ({}) must be less than {} ({})",
            lower_name,
            lower,
            upper_name,
            upper
        );
    }
    Ok(())
}

impl ChimerismConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref w) = self.kmr_weights {
            for (name, val) in [
                ("level", w.level),
                ("trend", w.trend),
                ("volatility", w.volatility),
                ("anomaly", w.anomaly),
                ("residual", w.residual),
            ] {
                check_weight("kmr_weights", name, val)?;
            }
        }
        if let Some(ref w) = self.lab_weights {
            check_weight("lab_weights", "level", w.level)?;
            check_weight("lab_weights", "trend", w.trend)?;
        }
        if let Some(ref b) = self.blend {
            check_weight("blend", "kmr", b.kmr)?;
            check_weight("blend", "lab", b.lab)?;
        }

        let thresholds = self.clinical_thresholds();
        let kmr = thresholds.kmr;
        check_positive("thresholds.kmr.normal_upper", kmr.normal_upper)?;
        check_ascending(
            "thresholds.kmr.normal_upper",
            kmr.normal_upper,
            "thresholds.kmr.dikkat_upper",
            kmr.dikkat_upper,
        )?;
        check_ascending(
            "thresholds.kmr.dikkat_upper",
            kmr.dikkat_upper,
            "thresholds.kmr.kritik_upper",
            kmr.kritik_upper,
        )?;

        let kre = thresholds.kre;
        check_positive("thresholds.kre.very_good_lt", kre.very_good_lt)?;
        check_ascending(
            "thresholds.kre.very_good_lt",
            kre.very_good_lt,
            "thresholds.kre.very_bad_gt",
            kre.very_bad_gt,
        )?;

        let gfr = thresholds.gfr;
        check_positive("thresholds.gfr.very_bad_le", gfr.very_bad_le)?;
        check_ascending(
            "thresholds.gfr.very_bad_le",
            gfr.very_bad_le,
            "thresholds.gfr.very_good_ge",
            gfr.very_good_ge,
        )?;

        let alarm = self.alarm_thresholds();
        for (name, value) in [
            ("alarm.dikkat", alarm.dikkat),
            ("alarm.kritik", alarm.kritik),
            ("alarm.cok_kritik", alarm.cok_kritik),
        ] {
            if value <= 0.0 || value > 100.0 {
                anyhow::bail!("{} must be in (0, 100] (got {})", name, value);
            }
        }
        check_ascending("alarm.dikkat", alarm.dikkat, "alarm.kritik", alarm.kritik)?;
        check_ascending("alarm.kritik", alarm.kritik, "alarm.cok_kritik", alarm.cok_kritik)?;

        self.build_grid().context("invalid grid")?;

        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let include = if self.include.is_empty() {
            None
        } else {
            Some(build_globset(&self.include)?)
        };
        let exclude = build_globset(&self.exclude)?;

        let kmr_weights = match &self.kmr_weights {
            Some(w) => {
                let d = KmrWeights::default();
                KmrWeights {
                    level: w.level.unwrap_or(d.level),
                    trend: w.trend.unwrap_or(d.trend),
                    volatility: w.volatility.unwrap_or(d.volatility),
                    anomaly: w.anomaly.unwrap_or(d.anomaly),
                    residual: w.residual.unwrap_or(d.residual),
                }
            }
            None => KmrWeights::default(),
        };

        let lab_weights = match &self.lab_weights {
            Some(w) => {
                let d = LabWeights::default();
                LabWeights {
                    level: w.level.unwrap_or(d.level),
                    trend: w.trend.unwrap_or(d.trend),
                }
            }
            None => LabWeights::default(),
        };

        let blend = match &self.blend {
            Some(b) => {
                let d = BlendWeights::default();
                BlendWeights {
                    kmr: b.kmr.unwrap_or(d.kmr),
                    lab: b.lab.unwrap_or(d.lab),
                }
            }
            None => BlendWeights::default(),
        };

        Ok(ResolvedConfig {
            include,
            exclude,
            params: ScoringParams {
                kmr_weights,
                lab_weights,
                blend,
                thresholds: self.clinical_thresholds(),
                alarm: self.alarm_thresholds(),
            },
            grid: self.build_grid()?,
            config_path: None,
        })
    }

    fn clinical_thresholds(&self) -> ClinicalThresholds {
        let mut resolved = ClinicalThresholds::default();
        let Some(ref t) = self.thresholds else {
            return resolved;
        };

        if let Some(ref kmr) = t.kmr {
            let d = KmrThresholds::default();
            resolved.kmr = KmrThresholds {
                normal_upper: kmr.normal_upper.unwrap_or(d.normal_upper),
                dikkat_upper: kmr.dikkat_upper.unwrap_or(d.dikkat_upper),
                kritik_upper: kmr.kritik_upper.unwrap_or(d.kritik_upper),
            };
        }
        if let Some(ref kre) = t.kre {
            let d = KreThresholds::default();
            resolved.kre = KreThresholds {
                very_good_lt: kre.very_good_lt.unwrap_or(d.very_good_lt),
                very_bad_gt: kre.very_bad_gt.unwrap_or(d.very_bad_gt),
            };
        }
        if let Some(ref gfr) = t.gfr {
            let d = GfrThresholds::default();
            resolved.gfr = GfrThresholds {
                very_good_ge: gfr.very_good_ge.unwrap_or(d.very_good_ge),
                very_bad_le: gfr.very_bad_le.unwrap_or(d.very_bad_le),
            };
        }
        resolved
    }

    fn alarm_thresholds(&self) -> AlarmThresholds {
        let d = AlarmThresholds::default();
        match &self.alarm {
            Some(a) => AlarmThresholds {
                dikkat: a.dikkat.unwrap_or(d.dikkat),
                kritik: a.kritik.unwrap_or(d.kritik),
                cok_kritik: a.cok_kritik.unwrap_or(d.cok_kritik),
            },
            None => d,
        }
    }

    fn build_grid(&self) -> Result<CanonicalGrid> {
        match &self.grid {
            Some(slots) => CanonicalGrid::new(
                slots
                    .iter()
                    .map(|s| TimeSlot {
                        key: s.key.clone(),
                        order: s.order,
                        pseudo_day_offset: s.pseudo_days,
                        kmr_applicable: s.kmr,
                        lab_applicable: s.lab,
                    })
                    .collect(),
            ),
            None => Ok(CanonicalGrid::standard()),
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

impl ResolvedConfig {
    /// Check if a patient should be scored based on include/exclude patterns
    pub fn should_include_patient(&self, patient_id: &str) -> bool {
        if self.exclude.is_match(patient_id) {
            return false;
        }
        if let Some(ref include) = self.include {
            return include.is_match(patient_id);
        }
        true
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        ChimerismConfig::default().resolve()
    }

    /// Fully populated config equivalent to this resolution
    pub fn effective_config(&self) -> ChimerismConfig {
        let p = &self.params;
        ChimerismConfig {
            include: Vec::new(),
            exclude: Vec::new(),
            kmr_weights: Some(KmrWeightConfig {
                level: Some(p.kmr_weights.level),
                trend: Some(p.kmr_weights.trend),
                volatility: Some(p.kmr_weights.volatility),
                anomaly: Some(p.kmr_weights.anomaly),
                residual: Some(p.kmr_weights.residual),
            }),
            lab_weights: Some(LabWeightConfig {
                level: Some(p.lab_weights.level),
                trend: Some(p.lab_weights.trend),
            }),
            blend: Some(BlendConfig {
                kmr: Some(p.blend.kmr),
                lab: Some(p.blend.lab),
            }),
            thresholds: Some(ThresholdConfig {
                kmr: Some(KmrThresholdConfig {
                    normal_upper: Some(p.thresholds.kmr.normal_upper),
                    dikkat_upper: Some(p.thresholds.kmr.dikkat_upper),
                    kritik_upper: Some(p.thresholds.kmr.kritik_upper),
                }),
                kre: Some(KreThresholdConfig {
                    very_good_lt: Some(p.thresholds.kre.very_good_lt),
                    very_bad_gt: Some(p.thresholds.kre.very_bad_gt),
                }),
                gfr: Some(GfrThresholdConfig {
                    very_good_ge: Some(p.thresholds.gfr.very_good_ge),
                    very_bad_le: Some(p.thresholds.gfr.very_bad_le),
                }),
            }),
            alarm: Some(AlarmConfig {
                dikkat: Some(p.alarm.dikkat),
                kritik: Some(p.alarm.kritik),
                cok_kritik: Some(p.alarm.cok_kritik),
            }),
            grid: Some(
                self.grid
                    .slots()
                    .iter()
                    .map(|s| GridSlotConfig {
                        key: s.key.clone(),
                        order: s.order,
                        pseudo_days: s.pseudo_day_offset,
                        kmr: s.kmr_applicable,
                        lab: s.lab_applicable,
                    })
                    .collect(),
            ),
        }
    }
}

/// Discover and load a config file from a directory
///
/// Search order:
/// 1. `.chimerismrc.json`
/// 2. `chimerism.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(ChimerismConfig, PathBuf)>> {
    for name in [".chimerismrc.json", "chimerism.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<ChimerismConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: ChimerismConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (ChimerismConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(json: &str) -> ChimerismConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ChimerismConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert!(resolved.include.is_none());
        assert_eq!(resolved.params, ScoringParams::default());
        assert_eq!(resolved.grid, CanonicalGrid::standard());
    }

    #[test]
    fn test_parse_minimal_config() {
        parse("{}").validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"{
            "include": ["P0*"],
            "exclude": ["P099"],
            "kmr_weights": {"level": 0.4, "trend": 0.2, "volatility": 0.1, "anomaly": 0.15, "residual": 0.15},
            "lab_weights": {"level": 0.7, "trend": 0.3},
            "blend": {"kmr": 0.7, "lab": 0.3},
            "thresholds": {
                "kmr": {"normal_upper": 0.4, "dikkat_upper": 1.5, "kritik_upper": 4.0},
                "kre": {"very_good_lt": 1.1, "very_bad_gt": 4.0},
                "gfr": {"very_good_ge": 85.0, "very_bad_le": 20.0}
            },
            "alarm": {"dikkat": 25.0, "kritik": 55.0, "cok_kritik": 75.0}
        }"#,
        );
        config.validate().unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.params.kmr_weights.level, 0.4);
        assert_eq!(resolved.params.lab_weights.level, 0.7);
        assert_eq!(resolved.params.blend.kmr, 0.7);
        assert_eq!(resolved.params.thresholds.kmr.kritik_upper, 4.0);
        assert_eq!(resolved.params.thresholds.gfr.very_bad_le, 20.0);
        assert_eq!(resolved.params.alarm.cok_kritik, 75.0);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<ChimerismConfig, _> = serde_json::from_str(r#"{"weights": {}}"#);
        assert!(result.is_err(), "unknown fields should be rejected");
        let nested: Result<ChimerismConfig, _> =
            serde_json::from_str(r#"{"blend": {"kmr": 0.5, "other": 0.5}}"#);
        assert!(nested.is_err());
    }

    #[test]
    fn test_reject_out_of_range_weights() {
        assert!(parse(r#"{"kmr_weights": {"level": -0.1}}"#).validate().is_err());
        assert!(parse(r#"{"lab_weights": {"trend": 11.0}}"#).validate().is_err());
        assert!(parse(r#"{"blend": {"lab": -1.0}}"#).validate().is_err());
    }

    #[test]
    fn test_reject_unordered_thresholds() {
        let config = parse(r#"{"thresholds": {"kmr": {"dikkat_upper": 6.0}}}"#);
        assert!(config.validate().is_err());
        let config = parse(r#"{"thresholds": {"gfr": {"very_bad_le": 95.0}}}"#);
        assert!(config.validate().is_err());
        let config = parse(r#"{"thresholds": {"kre": {"very_good_lt": -1.0}}}"#);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_bad_alarm_thresholds() {
        assert!(parse(r#"{"alarm": {"kritik": 20.0}}"#).validate().is_err());
        assert!(parse(r#"{"alarm": {"cok_kritik": 120.0}}"#).validate().is_err());
        assert!(parse(r#"{"alarm": {"dikkat": 0.0}}"#).validate().is_err());
    }

    #[test]
    fn test_custom_grid() {
        let config = parse(
            r#"{"grid": [
                {"key": "Baseline", "order": 1, "pseudo_days": 0, "kmr": true, "lab": true},
                {"key": "Week_1", "order": 2, "pseudo_days": 7, "kmr": true}
            ]}"#,
        );
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.grid.len(), 2);
        assert!(!resolved.grid.lookup("Week_1").unwrap().lab_applicable);
    }

    #[test]
    fn test_reject_invalid_grid() {
        let unordered = parse(
            r#"{"grid": [
                {"key": "A", "order": 2, "pseudo_days": 1, "kmr": true},
                {"key": "B", "order": 1, "pseudo_days": 2, "kmr": true}
            ]}"#,
        );
        assert!(unordered.validate().is_err());
        assert!(parse(r#"{"grid": []}"#).validate().is_err());
    }

    #[test]
    fn test_reject_invalid_glob_pattern() {
        assert!(parse(r#"{"include": ["[invalid"]}"#).validate().is_err());
    }

    #[test]
    fn test_patient_selection() {
        let resolved = parse(r#"{"include": ["P0*"], "exclude": ["P007"]}"#)
            .resolve()
            .unwrap();
        assert!(resolved.should_include_patient("P001"));
        assert!(!resolved.should_include_patient("P007"));
        assert!(!resolved.should_include_patient("X100"));

        let defaults = ResolvedConfig::defaults().unwrap();
        assert!(defaults.should_include_patient("anything"));
    }

    #[test]
    fn test_partial_weights_use_defaults_for_rest() {
        let resolved = parse(r#"{"kmr_weights": {"trend": 0.5}}"#).resolve().unwrap();
        assert_eq!(resolved.params.kmr_weights.trend, 0.5);
        assert_eq!(resolved.params.kmr_weights.level, 0.35); // default
        assert_eq!(resolved.params.kmr_weights.residual, 0.15); // default
    }

    #[test]
    fn test_partial_thresholds_use_defaults_for_rest() {
        let resolved = parse(r#"{"thresholds": {"kmr": {"kritik_upper": 8.0}}}"#)
            .resolve()
            .unwrap();
        assert_eq!(resolved.params.thresholds.kmr.kritik_upper, 8.0);
        assert_eq!(resolved.params.thresholds.kmr.normal_upper, 0.5); // default
        assert_eq!(resolved.params.thresholds.kre, KreThresholds::default());
    }

    #[test]
    fn test_effective_config_round_trips() {
        let resolved = parse(r#"{"alarm": {"dikkat": 35.0}}"#).resolve().unwrap();
        let effective = resolved.effective_config();
        let json = serde_json::to_string(&effective).unwrap();
        let reparsed = parse(&json).resolve().unwrap();
        assert_eq!(reparsed.params, resolved.params);
        assert_eq!(reparsed.grid, resolved.grid);
    }

    #[test]
    fn test_discover_chimerismrc() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".chimerismrc.json");
        fs::write(&config_path, r#"{"blend": {"kmr": 0.8}}"#).unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.blend.unwrap().kmr, Some(0.8));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();

        // Both present - .chimerismrc.json should win
        fs::write(dir.path().join(".chimerismrc.json"), r#"{"alarm": {"dikkat": 20.0}}"#).unwrap();
        fs::write(
            dir.path().join("chimerism.config.json"),
            r#"{"alarm": {"dikkat": 40.0}}"#,
        )
        .unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(
            config.alarm.unwrap().dikkat,
            Some(20.0),
            ".chimerismrc.json should take priority"
        );
    }

    #[test]
    fn test_discover_config_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chimerism.config.json"), r#"{"exclude": ["T*"]}"#).unwrap();
        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.exclude, vec!["T*"]);
    }

    #[test]
    fn test_no_config_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.params.blend.kmr, 0.65);
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.json");
        fs::write(&config_path, r#"{"lab_weights": {"level": 1.0}}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&config_path)).unwrap();
        assert_eq!(resolved.params.lab_weights.level, 1.0);
        assert_eq!(resolved.config_path, Some(config_path));
    }

    #[test]
    fn test_load_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("bad.json");
        fs::write(&config_path, r#"{"alarm": {"dikkat": 90.0}}"#).unwrap();
        let err = load_config_file(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json"));
    }
}
