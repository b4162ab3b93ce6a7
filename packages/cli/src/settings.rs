use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use store::DaybookConfig;

/// Layered client settings: defaults, then `daybook.toml` (or `path`), then
/// `DAYBOOK_<SECTION>__<KEY>` environment variables.
pub(crate) fn load(path: Option<&Path>) -> Result<DaybookConfig, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).format(FileFormat::Toml).required(true),
        None => File::with_name(DaybookConfig::filename())
            .format(FileFormat::Toml)
            .required(false),
    };

    let config = Config::builder()
        .set_default("app.site_url", "http://localhost:8080")?
        .set_default("days.policy", "local")?
        .set_default("history.recent_limit", 7)?
        .add_source(file)
        .add_source(
            Environment::with_prefix("DAYBOOK")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    config.try_deserialize()
}
