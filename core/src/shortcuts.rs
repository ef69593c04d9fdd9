use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::settings::SettingsStore;

const TRACKED_SHORTCUTS_KEY: &str = "tracked_shortcuts";

/// An opaque record the agent persists on behalf of the UI; the agent never
/// interprets `exe`/`start_dir`/`app_id` beyond matching on them for
/// `delete_game`. `app_id == 0` means "assignment pending from the UI".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedShortcut {
    pub name: String,
    pub exe: String,
    #[serde(rename = "startDir")]
    pub start_dir: String,
    #[serde(rename = "appId")]
    pub app_id: u64,
    #[serde(rename = "gameName")]
    pub game_name: String,
    #[serde(rename = "installedAt")]
    pub installed_at: u64,
}

pub fn load(settings: &SettingsStore) -> Vec<TrackedShortcut> {
    let value = settings.get(TRACKED_SHORTCUTS_KEY, Value::Array(Vec::new()));
    serde_json::from_value(value).unwrap_or_default()
}

pub fn save(settings: &SettingsStore, shortcuts: &[TrackedShortcut]) -> std::io::Result<()> {
    #[expect(clippy::unwrap_used, reason = "a [TrackedShortcut] always serializes")]
    let value = serde_json::to_value(shortcuts).unwrap();
    settings.set(TRACKED_SHORTCUTS_KEY, value)
}

pub fn append(settings: &SettingsStore, shortcut: TrackedShortcut) -> std::io::Result<()> {
    let mut shortcuts = load(settings);
    shortcuts.push(shortcut);
    save(settings, &shortcuts)
}

/// Assign `app_id` to the tracked shortcut matching `game_name` whose
/// `app_id` is still pending (`0`), once Steam has assigned one. Returns
/// `false` if no such pending shortcut exists.
pub fn set_app_id_by_game_name(settings: &SettingsStore, game_name: &str, app_id: u64) -> std::io::Result<bool> {
    let mut shortcuts = load(settings);
    let Some(shortcut) = shortcuts.iter_mut().find(|s| s.game_name == game_name && s.app_id == 0) else {
        return Ok(false);
    };
    shortcut.app_id = app_id;
    save(settings, &shortcuts)?;
    Ok(true)
}

/// Remove the tracked shortcut matching `app_id`, if any, returning it.
pub fn remove_by_app_id(settings: &SettingsStore, app_id: u64) -> std::io::Result<Option<TrackedShortcut>> {
    let mut shortcuts = load(settings);
    let index = shortcuts.iter().position(|s| s.app_id == app_id);
    let removed = index.map(|i| shortcuts.remove(i));
    if removed.is_some() {
        save(settings, &shortcuts)?;
    }
    Ok(removed)
}
