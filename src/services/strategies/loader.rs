// ============================================================================
// CHARGEMENT DES FICHIERS DE STRATÉGIE
// ============================================================================
//
// Un fichier de stratégie = un document JSON dans STRATEGIES_DIR :
//
//   {
//     "kind": "ema_alignment",              <- clé dans le StrategyRegistry
//     "display_name": "Pure Uptrend Filter",
//     "description": "Price > EMA20 > EMA50 > EMA200",
//     "strategy_type": "RULE_BASED",
//     "timeframe": "Daily",
//     "indicators_used": ["EMA20", "EMA50", "EMA200"],
//     "ai_logic": "TradingView Screener",
//     "criteria": "Perfect EMA Alignment",
//     "params": { "periods": [20, 50, 200] }
//   }
//
// Règles:
//   - JSON illisible                    -> StrategyError::Load
//   - kind inconnu / tableau vide       -> StrategyError::NotFound
//   - tableau avec plusieurs définitions -> StrategyError::Ambiguous
//   - script_name = nom du fichier
//   - template.json et schema.json sont réservés (jamais scannés ni uploadables)
//
// ============================================================================

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::registry::{StrategyContext, StrategyRegistry};
use super::strategy_trait::{Strategy, StrategyDescriptor, StrategyError};

pub const STRATEGY_EXTENSION: &str = "json";
pub const RESERVED_FILES: [&str; 2] = ["template.json", "schema.json"];

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyDefinition {
    pub kind: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_strategy_type")]
    pub strategy_type: String,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub indicators_used: Vec<String>,
    #[serde(default)]
    pub ai_logic: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub params: Value,
    /// Nom du fichier d'origine, renseigné par read_definition
    #[serde(skip)]
    pub script_name: String,
}

fn default_strategy_type() -> String {
    "RULE_BASED".to_string()
}

impl StrategyDefinition {
    pub fn descriptor(&self, script_name: &str) -> StrategyDescriptor {
        StrategyDescriptor {
            script_name: script_name.to_string(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            strategy_type: self.strategy_type.clone(),
            timeframe: self.timeframe.clone(),
            indicators_used: self.indicators_used.clone(),
            ai_logic: self.ai_logic.clone(),
            criteria: self.criteria.clone(),
        }
    }

    pub fn file_descriptor(&self) -> StrategyDescriptor {
        self.descriptor(&self.script_name)
    }

    /// Désérialise `params` vers la config de la stratégie (objet vide / null -> Default)
    pub fn params<T>(&self) -> Result<T, StrategyError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.params.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.params.clone()).map_err(|e| StrategyError::InvalidParams {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

pub fn is_reserved(file_name: &str) -> bool {
    RESERVED_FILES.contains(&file_name)
}

pub fn script_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Liste triée des fichiers .json du dossier (hors fichiers réservés).
/// Un dossier absent donne une liste vide.
pub fn scan_strategy_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_strategy = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(STRATEGY_EXTENSION));
        if is_strategy && !is_reserved(&script_name_of(&path)) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Lit le fichier et renvoie l'unique définition qu'il déclare
pub fn read_definition(path: &Path) -> Result<StrategyDefinition, StrategyError> {
    let load_error = |reason: String| StrategyError::Load {
        path: path.display().to_string(),
        reason,
    };

    let raw = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let document: Value = serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;

    let mut candidates = match document {
        Value::Array(items) => items,
        other => vec![other],
    };

    match candidates.len() {
        0 => Err(StrategyError::NotFound(format!(
            "No strategy definition found in {}",
            path.display()
        ))),
        1 => {
            let mut definition: StrategyDefinition =
                serde_json::from_value(candidates.remove(0)).map_err(|e| load_error(e.to_string()))?;
            definition.script_name = script_name_of(path);
            Ok(definition)
        }
        n => Err(StrategyError::Ambiguous(format!(
            "{} defines {} strategies; a strategy file must define exactly one",
            path.display(),
            n
        ))),
    }
}

/// Métadonnées sans instancier la stratégie. `script_name` est passé à part
/// pour les fichiers encore sous un nom temporaire (upload).
pub fn read_descriptor(
    path: &Path,
    script_name: &str,
    registry: &StrategyRegistry,
) -> Result<StrategyDescriptor, StrategyError> {
    let definition = read_definition(path)?;
    if !registry.contains(&definition.kind) {
        return Err(registry.unknown_kind(&definition.kind));
    }
    Ok(definition.descriptor(script_name))
}

pub fn load_metadata(path: &Path, registry: &StrategyRegistry) -> Result<StrategyDescriptor, StrategyError> {
    read_descriptor(path, &script_name_of(path), registry)
}

pub fn load_strategy(
    path: &Path,
    registry: &StrategyRegistry,
    context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    let definition = read_definition(path)?;
    registry.build(&definition, context)
}
