use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::OptionExt;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use nfcemu_core::{
    AidRegistry, CommunicationLog, DefaultResponse, Emulator, MemoryAidRegistry,
    MemoryScenarioStore, MemorySettings, Scenario, ScenarioStore, VersionClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix of environment variables overriding the config file
pub(crate) const ENV_PREFIX: &str = "NFCEMU_";

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) server: ServerConfig,
    pub(crate) remote: RemoteConfig,
    pub(crate) responses: ResponsesConfig,
    pub(crate) scenarios: ScenariosConfig,
    pub(crate) aids: Vec<String>,
    /// Root of saved communication logs, `~/.nfcemu/logs` when unset
    pub(crate) log_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    pub(crate) enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            enabled: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct RemoteConfig {
    pub(crate) address: Option<String>,
    pub(crate) port: u16,
    pub(crate) interval_ms: u64,
    pub(crate) auto_connect: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: 80,
            interval_ms: 1000,
            auto_connect: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct ResponsesConfig {
    pub(crate) selected: DefaultResponse,
    pub(crate) unselected: DefaultResponse,
}

impl Default for ResponsesConfig {
    fn default() -> Self {
        Self {
            selected: DefaultResponse::Success,
            unselected: DefaultResponse::FileNotFound,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub(crate) struct ScenariosConfig {
    pub(crate) list: Vec<Scenario>,
    pub(crate) current: Option<String>,
    pub(crate) run: bool,
}

impl Config {
    /// Assemble an emulator seeded with the configured state
    ///
    /// Invalid scenarios and AIDs are skipped with a warning. An unknown
    /// `current` scenario is an error.
    pub(crate) fn build_emulator(&self) -> eyre::Result<Emulator> {
        let clock = VersionClock::new();
        let aids = Arc::new(MemoryAidRegistry::new(clock.clone()));
        let store = Arc::new(MemoryScenarioStore::new(clock.clone()));
        let settings = Arc::new(MemorySettings::with_responses(
            clock.clone(),
            self.responses.selected,
            self.responses.unselected,
        ));
        let log_root = match &self.log_dir {
            Some(dir) => dir.clone(),
            None => config_dir()?.join("logs"),
        };

        for scenario in &self.scenarios.list {
            if let Err(e) = store.upsert(scenario.clone()) {
                warn!(name = %scenario.name, %e, "Skipping invalid scenario");
            }
        }
        for aid in &self.aids {
            if let Err(e) = aids.add(aid) {
                warn!(%aid, %e, "Skipping invalid AID");
            }
        }

        let emulator = Emulator::new(
            clock,
            aids,
            store,
            settings,
            Arc::new(CommunicationLog::new(log_root)),
        );
        if let Some(current) = self.scenarios.current.as_deref() {
            emulator.engine().set_current(Some(current))?;
            if self.scenarios.run {
                emulator.engine().set_running(true);
            }
        }
        debug!(snapshot = ?emulator.engine().snapshot(), "Emulator ready");
        Ok(emulator)
    }
}

/// Returns the base config directory for nfcemu
pub(crate) fn config_dir() -> eyre::Result<PathBuf> {
    Ok(std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".nfcemu"))
}

/// Load the config from `path` (or `~/.nfcemu/nfcemu.toml`), then apply
/// `NFCEMU_` environment overrides
///
/// A missing file yields the defaults. Nested keys are separated by a double
/// underscore, e.g. `NFCEMU_SERVER__PORT=9090`.
pub(crate) fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("nfcemu.toml"),
    };
    debug!(path = %path.display(), "Loading config");
    Ok(Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?)
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use nfcemu_core::Status;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|jail| {
            let config = load_config(Some(&jail.directory().join("missing.toml"))).unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.remote.interval_ms, 1000);
            assert_eq!(config.responses.selected, DefaultResponse::Success);
            assert_eq!(config.responses.unselected, DefaultResponse::FileNotFound);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nfcemu.toml",
                r#"
                aids = ["F0010203040506"]

                [server]
                port = 9000

                [remote]
                address = "10.0.0.2"
                port = 8081
                auto_connect = true

                [responses]
                unselected = "Success"

                [scenarios]
                current = "pay"
                run = true

                [[scenarios.list]]
                name = "pay"
                aid = "F0010203040506"
                selectOnce = true

                [[scenarios.list.steps]]
                name = "gpo"
                request = "80A80000"
                response = "9000"
                "#,
            )?;
            jail.set_env("NFCEMU_SERVER__PORT", "9191");
            jail.set_env("NFCEMU_REMOTE__INTERVAL_MS", "2500");

            let config = load_config(Some(&jail.directory().join("nfcemu.toml"))).unwrap();
            assert_eq!(config.server.port, 9191);
            assert!(config.server.enabled);
            assert_eq!(config.remote.address.as_deref(), Some("10.0.0.2"));
            assert_eq!(config.remote.port, 8081);
            assert_eq!(config.remote.interval_ms, 2500);
            assert!(config.remote.auto_connect);
            assert_eq!(config.responses.unselected, DefaultResponse::Success);
            assert_eq!(config.scenarios.list.len(), 1);
            assert_eq!(config.scenarios.list[0].steps.len(), 1);
            Ok(())
        });
    }

    #[test]
    fn test_build_emulator_seeds_state() {
        let logs = tempfile::tempdir().unwrap();
        let config = Config {
            aids: vec!["f0010203040506".into(), "bad".into()],
            scenarios: ScenariosConfig {
                list: vec![Scenario::new("pay", "F0010203040506", false), Scenario::new("", "", false)],
                current: Some("pay".into()),
                run: true,
            },
            log_dir: Some(logs.path().to_path_buf()),
            ..Default::default()
        };

        let emulator = config.build_emulator().unwrap();
        assert_eq!(emulator.aids().list(), vec!["F0010203040506"]);
        assert_eq!(emulator.store().names(), vec!["pay"]);
        let snapshot = emulator.engine().snapshot();
        assert_eq!(snapshot.current.as_deref(), Some("pay"));
        assert!(snapshot.running);
        assert_eq!(emulator.status().current(), Status::Running);
    }

    #[test]
    fn test_build_emulator_rejects_unknown_current() {
        let logs = tempfile::tempdir().unwrap();
        let config = Config {
            scenarios: ScenariosConfig {
                current: Some("missing".into()),
                ..Default::default()
            },
            log_dir: Some(logs.path().to_path_buf()),
            ..Default::default()
        };
        assert!(config.build_emulator().is_err());
    }
}
