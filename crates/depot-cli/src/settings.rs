use std::path::Path;

use depot_config::{
    config::Config,
    settings::{get_setting, set_setting, SETTINGS},
};
use depot_operations::DepotResult;
use nu_ansi_term::Color::{Blue, Cyan, Green, Red};
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::info;

use crate::{
    cli::{ConfigAction, RepoAction},
    utils::{term_width, Colored},
};

pub fn handle_config(
    config: &mut Config,
    config_path: &Path,
    action: Option<ConfigAction>,
) -> DepotResult<()> {
    match action {
        None => {
            info!("{}", config.to_toml()?);
        }
        Some(ConfigAction::List) => {
            info!("\n{}", settings_table(config));
        }
        Some(ConfigAction::Get {
            key,
        }) => {
            info!("{}", get_setting(config, &key)?);
        }
        Some(ConfigAction::Set {
            key,
            value,
        }) => {
            set_setting(config, &key, &value)?;
            config.resolve()?;
            config.save(config_path)?;
            info!(
                "{} = {}",
                Colored(Cyan, &key),
                Colored(Green, get_setting(config, &key)?)
            );
        }
    }
    Ok(())
}

fn settings_table(config: &Config) -> String {
    let mut builder = Builder::new();
    builder.push_record(["Setting", "Value", "Description"]);

    for setting in SETTINGS {
        builder.push_record([
            Colored(Cyan, setting.key).to_string(),
            Colored(Blue, (setting.get)(config)).to_string(),
            setting.description().trim().to_string(),
        ]);
    }

    builder
        .build()
        .with(Panel::header("Settings"))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string()
}

pub fn handle_repo_action(config: &mut Config, config_path: &Path, action: RepoAction) -> DepotResult<()> {
    let (name, enabled) = match action {
        RepoAction::Enable {
            name,
        } => (name, true),
        RepoAction::Disable {
            name,
        } => (name, false),
    };

    config.set_repository_enabled(&name, enabled)?;
    config.save(config_path)?;

    let status = if enabled {
        Colored(Green, "enabled")
    } else {
        Colored(Red, "disabled")
    };
    info!("Repository {} {status}", Colored(Cyan, &name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_set_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default_config();

        handle_config(
            &mut config,
            &path,
            Some(ConfigAction::Set {
                key: "search_limit".into(),
                value: "25".into(),
            }),
        )
        .unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.search_limit(), 25);
    }

    #[test]
    fn test_unknown_setting_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default_config();

        let result = handle_config(
            &mut config,
            &path,
            Some(ConfigAction::Get {
                key: "no_such_key".into(),
            }),
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_disable_repository() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default_config();
        let name = config.repositories[0].name.clone();

        handle_repo_action(
            &mut config,
            &path,
            RepoAction::Disable {
                name: name.clone(),
            },
        )
        .unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert!(!reloaded.get_repository(&name).unwrap().is_enabled());
    }

    #[test]
    fn test_settings_table_lists_every_key() {
        let table = settings_table(&Config::default_config());
        for setting in SETTINGS {
            assert!(table.contains(setting.key), "{} missing", setting.key);
        }
    }
}
