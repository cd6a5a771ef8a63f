use crate::error::{BenchError, Result};

/// Nomes curtos de modelo aceitos na linha de comando e no arquivo de configuração.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelTier {
    pub fn api_id(self) -> &'static str {
        match self {
            ModelTier::Haiku => "claude-haiku-4-5-20251001",
            ModelTier::Sonnet => "claude-sonnet-4-5-20250929",
            ModelTier::Opus => "claude-opus-4-6",
        }
    }

    fn from_alias(name: &str) -> Option<Self> {
        match name {
            "haiku" => Some(ModelTier::Haiku),
            "sonnet" => Some(ModelTier::Sonnet),
            "opus" => Some(ModelTier::Opus),
            _ => None,
        }
    }
}

/// Resolve um nome de modelo para o id enviado à API.
///
/// Aliases viram ids fixos; ids `claude-*` completos passam sem alteração.
pub fn resolve_model(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let lower = trimmed.to_lowercase();
    if let Some(tier) = ModelTier::from_alias(&lower) {
        return Ok(tier.api_id().to_string());
    }
    let valid_id = lower.starts_with("claude-")
        && lower.len() > "claude-".len()
        && lower
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid_id {
        Ok(lower)
    } else {
        Err(BenchError::UnknownModel(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_pinned_ids() {
        assert_eq!(resolve_model("haiku").unwrap(), "claude-haiku-4-5-20251001");
        assert_eq!(resolve_model("Sonnet").unwrap(), "claude-sonnet-4-5-20250929");
        assert_eq!(resolve_model(" opus ").unwrap(), "claude-opus-4-6");
    }

    #[test]
    fn full_ids_pass_through() {
        assert_eq!(
            resolve_model("claude-3-5-haiku-20241022").unwrap(),
            "claude-3-5-haiku-20241022"
        );
    }

    #[test]
    fn unknown_models_are_rejected() {
        assert!(matches!(
            resolve_model("gpt-4o-mini"),
            Err(BenchError::UnknownModel(name)) if name == "gpt-4o-mini"
        ));
        assert!(resolve_model("claude-").is_err());
        assert!(resolve_model("").is_err());
    }
}
