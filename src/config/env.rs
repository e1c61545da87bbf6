use super::{AppConfig, BotType, ConfigError};

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "DIFY2OPENAI_CONFIG";

const DIFY_API_URL: &str = "DIFY_API_URL";
const BOT_TYPE: &str = "BOT_TYPE";
const INPUT_VARIABLE: &str = "INPUT_VARIABLE";
const OUTPUT_VARIABLE: &str = "OUTPUT_VARIABLE";
const PORT: &str = "PORT";
const HOST: &str = "HOST";
const LOG_LEVEL: &str = "LOG_LEVEL";

/// Overlay deployment environment variables onto a file-based config.
///
/// Empty values are treated as unset.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] when `BOT_TYPE` or `PORT` cannot be parsed.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(base_url) = get(DIFY_API_URL) {
        config.upstream.base_url = base_url.trim().to_string();
    }
    if let Some(bot_type) = get(BOT_TYPE) {
        config.upstream.bot_type = bot_type
            .trim()
            .parse::<BotType>()
            .map_err(|message| ConfigError::Env {
                name: BOT_TYPE,
                message,
            })?;
    }
    if let Some(input) = get(INPUT_VARIABLE) {
        config.upstream.input_variable = Some(input);
    }
    if let Some(output) = get(OUTPUT_VARIABLE) {
        config.upstream.output_variable = Some(output);
    }
    if let Some(port) = get(PORT) {
        config.server.port = port.trim().parse().map_err(|err| ConfigError::Env {
            name: PORT,
            message: format!("{err}"),
        })?;
    }
    if let Some(host) = get(HOST) {
        config.server.host = host;
    }
    if let Some(level) = get(LOG_LEVEL) {
        config.features.log_level = level;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_env_overrides_upstream_fields() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env_of(&[
                ("DIFY_API_URL", "http://dify.local/v1"),
                ("BOT_TYPE", "Completion"),
                ("INPUT_VARIABLE", "query"),
                ("OUTPUT_VARIABLE", "text"),
                ("PORT", "8080"),
            ]),
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "http://dify.local/v1");
        assert_eq!(config.upstream.bot_type, BotType::Completion);
        assert_eq!(config.upstream.input_variable.as_deref(), Some("query"));
        assert_eq!(config.upstream.output_variable.as_deref(), Some("text"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.upstream.input_variable = Some("from_file".to_string());
        apply_env_overrides(
            &mut config,
            env_of(&[("INPUT_VARIABLE", ""), ("BOT_TYPE", "  ")]),
        )
        .unwrap();
        assert_eq!(config.upstream.input_variable.as_deref(), Some("from_file"));
        assert_eq!(config.upstream.bot_type, BotType::Chat);
    }

    #[test]
    fn test_invalid_bot_type_is_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env_of(&[("BOT_TYPE", "Agent")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "BOT_TYPE", .. }));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env_of(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));
    }
}
