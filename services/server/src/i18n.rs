use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Per-language translation cache backed by `<data_path>/i18n/<lang>.yaml`.
/// Lookups are keyed by `"<action>.<code>.<hash>"` where `hash` is the
/// zero-padded FNV-1a-32 hash of the default message (mod 10000) — this
/// lets the same numeric code carry different text per action without the
/// YAML file growing one entry per distinct message verbatim.
///
/// In dev mode, a cache miss is written straight back to the YAML file
/// using the input message as a translation placeholder, so the file
/// accumulates every user-facing string a developer needs to translate
/// without hand-seeding it up front. Outside dev mode, a miss just
/// falls back to the input message.
pub struct I18nStore {
    data_path: PathBuf,
    dev_mode: bool,
    cache: DashMap<String, HashMap<String, String>>,
    file_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl I18nStore {
    pub fn new(data_path: impl Into<PathBuf>, dev_mode: bool) -> Self {
        Self {
            data_path: data_path.into(),
            dev_mode,
            cache: DashMap::new(),
            file_locks: DashMap::new(),
        }
    }

    /// `default_language` gates the write-through: only a call made in the
    /// default language seeds the on-disk file with its own (untranslated)
    /// message text. A call in any other language only ever looks up an
    /// existing translation — a miss there just falls back to `msg`
    /// without touching that language's file, so a non-default-language
    /// request can never corrupt it with default-language text.
    pub async fn translate(
        &self,
        language: &str,
        default_language: &str,
        action: &str,
        code: i64,
        msg: &str,
    ) -> String {
        if msg.is_empty() {
            return msg.to_owned();
        }

        self.ensure_loaded(language).await;
        let key = cache_key(action, code, msg);

        if let Some(map) = self.cache.get(language) {
            if let Some(translated) = map.get(&key) {
                return translated.clone();
            }
        }

        if self.dev_mode && language == default_language {
            self.write_through(language, &key, msg).await;
        }

        msg.to_owned()
    }

    async fn ensure_loaded(&self, language: &str) {
        if self.cache.contains_key(language) {
            return;
        }

        let path = self.lang_file_path(language);
        let map = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_yaml::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        self.cache.insert(language.to_owned(), map);
    }

    async fn write_through(&self, language: &str, key: &str, msg: &str) {
        let lock = self
            .file_locks
            .entry(language.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(map) = self.cache.get(language) {
            if map.contains_key(key) {
                return;
            }
        }

        self.cache
            .entry(language.to_owned())
            .or_default()
            .insert(key.to_owned(), msg.to_owned());

        let path = self.lang_file_path(language);
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        if let Some(map) = self.cache.get(language) {
            if let Ok(yaml) = serde_yaml::to_string(&*map) {
                let _ = tokio::fs::write(&path, yaml).await;
            }
        }
    }

    fn lang_file_path(&self, language: &str) -> PathBuf {
        self.data_path.join("i18n").join(format!("{language}.yaml"))
    }
}

fn cache_key(action: &str, code: i64, msg: &str) -> String {
    format!("{action}.{code}.{}", ws_protocol::i18n_msg_hash(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn translate_falls_back_to_input_outside_dev_mode() {
        let dir = std::env::temp_dir().join(format!("ws-i18n-test-{}", std::process::id()));
        let store = I18nStore::new(dir, false);
        let msg = store.translate("zh", "zh", "login", 200001, "welcome").await;
        assert_eq!(msg, "welcome");
    }

    #[tokio::test]
    async fn translate_writes_through_in_dev_mode_and_reuses_cache() {
        let dir = std::env::temp_dir().join(format!("ws-i18n-test-dev-{}", std::process::id()));
        let store = I18nStore::new(&dir, true);

        let first = store.translate("zh", "zh", "login", 200001, "welcome").await;
        assert_eq!(first, "welcome");

        let path = dir.join("i18n").join("zh.yaml");
        assert!(tokio::fs::metadata(&path).await.is_ok());

        let second = store.translate("zh", "zh", "login", 200001, "welcome").await;
        assert_eq!(second, "welcome");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn translate_in_a_non_default_language_never_writes_through() {
        let dir = std::env::temp_dir().join(format!("ws-i18n-test-nondefault-{}", std::process::id()));
        let store = I18nStore::new(&dir, true);

        let msg = store.translate("en", "zh", "login", 200001, "welcome").await;
        assert_eq!(msg, "welcome", "miss in a non-default language still falls back to the input");

        let path = dir.join("i18n").join("en.yaml");
        assert!(
            tokio::fs::metadata(&path).await.is_err(),
            "a non-default-language miss must never create or seed that language's file"
        );

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn cache_key_matches_action_code_hash_shape() {
        let key = cache_key("login", 200001, "hello");
        assert_eq!(key, "login.200001.1723");
    }
}
