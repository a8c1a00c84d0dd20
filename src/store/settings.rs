//! The GuildConfig table.

use crate::config::GuildConfig;
use crate::error::Result;

use super::Store;

const GUILD_SETTINGS: &str = "guild_settings";

pub async fn load_all(store: &Store) -> Result<Vec<GuildConfig>> {
    store.read(GUILD_SETTINGS).await
}

pub async fn get_config(store: &Store, guild_id: u64) -> Result<Option<GuildConfig>> {
    let configs: Vec<GuildConfig> = store.read(GUILD_SETTINGS).await?;
    Ok(configs.into_iter().find(|c| c.guild_id == guild_id))
}

pub async fn save_config(store: &Store, config: GuildConfig) -> Result<()> {
    config.validate()?;

    store
        .update(GUILD_SETTINGS, move |configs: &mut Vec<GuildConfig>| {
            match configs.iter_mut().find(|c| c.guild_id == config.guild_id) {
                Some(existing) => *existing = config,
                None => configs.push(config),
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CampMode;
    use crate::store::temp_store;

    #[tokio::test]
    async fn save_and_reload_config() {
        let store = temp_store();

        save_config(&store, GuildConfig::standard(1)).await.unwrap();
        save_config(&store, GuildConfig::cyprus(2)).await.unwrap();

        let one = get_config(&store, 1).await.unwrap().unwrap();
        assert_eq!(one.mode, CampMode::Standard);
        let two = get_config(&store, 2).await.unwrap().unwrap();
        assert_eq!(two.mode, CampMode::Cyprus);
        assert!(get_config(&store, 3).await.unwrap().is_none());

        assert_eq!(load_all(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mode_switch_replaces_the_record() {
        let store = temp_store();

        save_config(&store, GuildConfig::standard(1)).await.unwrap();
        let mut config = get_config(&store, 1).await.unwrap().unwrap();
        config.mode = CampMode::Cyprus;
        save_config(&store, config).await.unwrap();

        let reloaded = get_config(&store, 1).await.unwrap().unwrap();
        assert_eq!(reloaded.mode, CampMode::Cyprus);
        assert_eq!(load_all(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_on_save() {
        let store = temp_store();

        let mut config = GuildConfig::standard(1);
        config.poll_publish_time = "half past two".to_owned();
        assert!(save_config(&store, config).await.is_err());
        assert!(get_config(&store, 1).await.unwrap().is_none());
    }
}
