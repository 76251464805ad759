// ============================================================
// Layer 3 — Model Descriptor
// ============================================================
// Records how the trained model was constructed so that the
// extraction pipeline can rebuild it later without knowing
// anything about this launcher.
//
// In memory the descriptor is a plain struct. It only becomes
// text at the external-command boundary, as two lines:
//
//   blueprints/xvector.json
//   xvector(feat_dim=23, num_targets=1211, nonlinearity=relu, aug_dropout=0.2, training=true, extracted_embedding=far)
//
// Deriving the inference variant for a tap point is a field
// update, so applying it twice gives the same result.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::LauncherError;

// ─── TapPoint ─────────────────────────────────────────────────────────────────
/// Where in the model the embedding is read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapPoint {
    /// Affine output of the last segment layer.
    Far,
    /// Affine output of the first segment layer.
    Near,
}

impl TapPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            TapPoint::Far  => "far",
            TapPoint::Near => "near",
        }
    }
}

impl fmt::Display for TapPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TapPoint {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "far"  => Ok(TapPoint::Far),
            "near" => Ok(TapPoint::Near),
            other  => Err(LauncherError::config(format!("unknown tap point '{other}'"))),
        }
    }
}

// ─── TrainingMode ─────────────────────────────────────────────────────────────
/// Inference mode skips the classifier head when the model is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    Training,
    Inference,
}

impl TrainingMode {
    pub fn from_flag(training: bool) -> Self {
        if training { TrainingMode::Training } else { TrainingMode::Inference }
    }

    pub fn is_training(self) -> bool {
        self == TrainingMode::Training
    }
}

// ─── Nonlinearity ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nonlinearity {
    Relu,
    LeakyRelu,
}

impl Nonlinearity {
    pub fn as_str(self) -> &'static str {
        match self {
            Nonlinearity::Relu      => "relu",
            Nonlinearity::LeakyRelu => "leaky_relu",
        }
    }
}

impl FromStr for Nonlinearity {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu"       => Ok(Nonlinearity::Relu),
            "leaky_relu" => Ok(Nonlinearity::LeakyRelu),
            other        => Err(LauncherError::config(format!("unknown nonlinearity '{other}'"))),
        }
    }
}

// ─── ModelDescriptor ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Blueprint copy inside model_dir/config.
    pub blueprint:     PathBuf,
    /// Registered factory name, e.g. "xvector".
    pub architecture:  String,
    pub feat_dim:      usize,
    pub num_targets:   usize,
    pub nonlinearity:  Nonlinearity,
    pub aug_dropout:   f64,
    pub training_mode: TrainingMode,
    pub tap_point:     TapPoint,
}

impl ModelDescriptor {
    /// Inference-time variant reading out at `tap_point`.
    pub fn for_inference(&self, tap_point: TapPoint) -> Self {
        Self {
            training_mode: TrainingMode::Inference,
            tap_point,
            ..self.clone()
        }
    }

    /// The second line of the text artifact.
    pub fn creation_expression(&self) -> String {
        format!(
            "{}(feat_dim={}, num_targets={}, nonlinearity={}, aug_dropout={}, training={}, extracted_embedding={})",
            self.architecture,
            self.feat_dim,
            self.num_targets,
            self.nonlinearity.as_str(),
            self.aug_dropout,
            self.training_mode.is_training(),
            self.tap_point,
        )
    }

    /// Full two-line text artifact.
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.blueprint.display(), self.creation_expression())
    }

    /// Inverse of [`ModelDescriptor::render`].
    pub fn parse(text: &str) -> Result<Self, LauncherError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let blueprint = lines
            .next()
            .ok_or_else(|| LauncherError::config("descriptor is empty"))?;
        let expression = lines
            .next()
            .ok_or_else(|| LauncherError::config("descriptor has no creation expression"))?;
        if lines.next().is_some() {
            return Err(LauncherError::config("descriptor has more than two lines"));
        }

        let (architecture, args) = expression
            .strip_suffix(')')
            .and_then(|e| e.split_once('('))
            .ok_or_else(|| LauncherError::config(format!("malformed creation expression '{expression}'")))?;
        if architecture.is_empty() {
            return Err(LauncherError::config("creation expression has no architecture"));
        }

        let mut feat_dim      = None;
        let mut num_targets   = None;
        let mut nonlinearity  = None;
        let mut aug_dropout   = None;
        let mut training_mode = None;
        let mut tap_point     = None;

        for arg in args.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| LauncherError::config(format!("argument '{arg}' is not key=value")))?;
            let bad = |what: &str| LauncherError::config(format!("bad {what} '{value}'"));
            match key.trim() {
                "feat_dim"            => feat_dim     = Some(value.parse().map_err(|_| bad("feat_dim"))?),
                "num_targets"         => num_targets  = Some(value.parse().map_err(|_| bad("num_targets"))?),
                "nonlinearity"        => nonlinearity = Some(value.parse()?),
                "aug_dropout"         => aug_dropout  = Some(value.parse().map_err(|_| bad("aug_dropout"))?),
                "training"            => {
                    let flag: bool = value.parse().map_err(|_| bad("training"))?;
                    training_mode = Some(TrainingMode::from_flag(flag));
                }
                "extracted_embedding" => tap_point = Some(value.parse()?),
                other => return Err(LauncherError::config(format!("unknown descriptor argument '{other}'"))),
            }
        }

        let missing = |name: &str| LauncherError::config(format!("descriptor is missing '{name}'"));
        Ok(Self {
            blueprint:     PathBuf::from(blueprint),
            architecture:  architecture.to_string(),
            feat_dim:      feat_dim.ok_or_else(|| missing("feat_dim"))?,
            num_targets:   num_targets.ok_or_else(|| missing("num_targets"))?,
            nonlinearity:  nonlinearity.ok_or_else(|| missing("nonlinearity"))?,
            aug_dropout:   aug_dropout.ok_or_else(|| missing("aug_dropout"))?,
            training_mode: training_mode.ok_or_else(|| missing("training"))?,
            tap_point:     tap_point.ok_or_else(|| missing("extracted_embedding"))?,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn training_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            blueprint:     PathBuf::from("exp/xv/config/xvector.json"),
            architecture:  "xvector".to_string(),
            feat_dim:      23,
            num_targets:   1211,
            nonlinearity:  Nonlinearity::Relu,
            aug_dropout:   0.2,
            training_mode: TrainingMode::Training,
            tap_point:     TapPoint::Far,
        }
    }

    #[test]
    fn test_render_layout() {
        let text = training_descriptor().render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "exp/xv/config/xvector.json");
        assert_eq!(
            lines[1],
            "xvector(feat_dim=23, num_targets=1211, nonlinearity=relu, aug_dropout=0.2, training=true, extracted_embedding=far)"
        );
    }

    #[test]
    fn test_parse_inverts_render() {
        let d = training_descriptor();
        assert_eq!(ModelDescriptor::parse(&d.render()).unwrap(), d);
    }

    #[test]
    fn test_inference_variant_only_touches_mode_and_tap_point() {
        let train = training_descriptor();
        let infer = train.for_inference(TapPoint::Near);

        let expected = train
            .render()
            .replace("training=true", "training=false")
            .replace("extracted_embedding=far", "extracted_embedding=near");
        assert_eq!(infer.render(), expected);
        assert_eq!(infer.blueprint,   train.blueprint);
        assert_eq!(infer.feat_dim,    train.feat_dim);
        assert_eq!(infer.num_targets, train.num_targets);
    }

    #[test]
    fn test_inference_variant_is_idempotent() {
        let once  = training_descriptor().for_inference(TapPoint::Near);
        let twice = once.for_inference(TapPoint::Near);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_same_tap_point_still_switches_mode() {
        let infer = training_descriptor().for_inference(TapPoint::Far);
        assert_eq!(infer.training_mode, TrainingMode::Inference);
        assert_eq!(infer.tap_point, TapPoint::Far);
    }

    #[test]
    fn test_parse_rejects_unknown_argument() {
        let text = "bp.json\nxvector(feat_dim=1, num_targets=2, nonlinearity=relu, aug_dropout=0, training=true, extracted_embedding=far, depth=3)";
        let err = ModelDescriptor::parse(text).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_parse_rejects_missing_expression() {
        assert!(ModelDescriptor::parse("only-a-path\n").is_err());
        assert!(ModelDescriptor::parse("").is_err());
    }

    #[test]
    fn test_parse_reports_missing_field() {
        let text = "bp.json\nxvector(feat_dim=1, num_targets=2, nonlinearity=relu, aug_dropout=0, training=true)";
        let err = ModelDescriptor::parse(text).unwrap_err();
        assert!(err.to_string().contains("extracted_embedding"));
    }
}
