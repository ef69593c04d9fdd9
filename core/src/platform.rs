use std::net::SocketAddr;
use std::net::UdpSocket;
use std::path::Path;
use std::path::PathBuf;

/// Result of probing the host for identity-relevant facts.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformInfo {
    pub platform: String,
    pub local_ipv4: String,
    pub hostname: String,
}

/// Probe the host. Never fails: falls back to `"linux"` / `127.0.0.1` when a
/// signal is unavailable, matching the original's best-effort detection.
pub fn probe() -> PlatformInfo {
    PlatformInfo {
        platform: detect_platform(Path::new("/")),
        local_ipv4: local_ipv4().unwrap_or_else(|| "127.0.0.1".to_string()),
        hostname: whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string()),
    }
}

/// Platform detection per the well-known filesystem markers, rooted at
/// `root` so tests can probe a scratch directory instead of `/`.
pub fn detect_platform(root: &Path) -> String {
    if root.join("home/deck").is_dir() {
        return "steamdeck".to_string();
    }
    if root.join("usr/share/plymouth/themes/legion-go").is_dir() {
        return "legiongologo".to_string();
    }
    if root.join("usr/share/plymouth/themes/rogally").is_dir() {
        return "rogally".to_string();
    }
    if let Ok(os_release) = std::fs::read_to_string(root.join("etc/os-release")) {
        let lower = os_release.to_lowercase();
        if lower.contains("steamos") {
            return "steamdeck".to_string();
        }
        if lower.contains("chimeraos") {
            return "chimeraos".to_string();
        }
        if lower.contains("bazzite") {
            return "bazzite".to_string();
        }
    }
    "linux".to_string()
}

/// First non-loopback IPv4 address, probed by connecting a UDP socket to a
/// well-known public address and reading back the OS-chosen local address.
/// No packet is actually sent.
fn local_ipv4() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr: SocketAddr = socket.local_addr().ok()?;
    Some(addr.ip().to_string())
}

/// Candidate home directories preferred over `$HOME`, in order, before
/// falling back to scanning `/home/*` for a `.steam/` child.
const PREFERRED_HOMES: &[&str] = &["/home/deck", "/home/lobinux"];

/// Resolve the user's real home directory for expanding a leading `~/` in
/// configured paths. Prefers well-known handheld-OS homes, then scans
/// `/home/*` for a directory containing `.steam/`, then falls back to the
/// process's `HOME` environment variable.
pub fn resolve_user_home(root: &Path) -> PathBuf {
    for candidate in PREFERRED_HOMES {
        let path = root.join(candidate.trim_start_matches('/'));
        if path.is_dir() {
            return path;
        }
    }
    if let Ok(entries) = std::fs::read_dir(root.join("home")) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.join(".steam").is_dir() {
                return path;
            }
        }
    }
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| root.join("home/unknown"))
}

/// Expand a leading `~/` against the resolved user home; paths without that
/// prefix are returned unchanged.
pub fn expand_home(path: &str, home: &Path) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Candidate Steam data directories under a resolved home, checked in order.
const STEAM_DIR_CANDIDATES: &[&str] = &[
    ".steam/steam",
    ".local/share/Steam",
    ".var/app/com.valvesoftware.Steam/.steam/steam",
];

pub fn resolve_steam_dir(home: &Path) -> Option<PathBuf> {
    STEAM_DIR_CANDIDATES
        .iter()
        .map(|candidate| home.join(candidate))
        .find(|path| path.is_dir())
}

/// One enumerated Steam user directory (`userdata/<id>`, excluding `0`).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SteamUser {
    pub id: String,
    #[serde(rename = "hasShortcuts")]
    pub has_shortcuts: bool,
}

/// Enumerate Steam user ids under `steam_dir/userdata`, read-only. Does not
/// parse the binary VDF shortcut file, only checks for its presence.
pub fn list_steam_users(steam_dir: &Path) -> Vec<SteamUser> {
    let userdata = steam_dir.join("userdata");
    let Ok(entries) = std::fs::read_dir(&userdata) else {
        return Vec::new();
    };
    let mut users = Vec::new();
    for entry in entries.flatten() {
        let Some(id) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if id == "0" || id.parse::<u64>().is_err() {
            continue;
        }
        let has_shortcuts = entry.path().join("config/shortcuts.vdf").is_file();
        users.push(SteamUser { id, has_shortcuts });
    }
    users.sort_by(|a, b| a.id.cmp(&b.id));
    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_steamdeck_from_home_deck() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("home/deck")).expect("mkdir");
        assert_eq!(detect_platform(dir.path()), "steamdeck");
    }

    #[test]
    fn falls_back_to_linux_with_no_markers() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(detect_platform(dir.path()), "linux");
    }

    #[test]
    fn detects_bazzite_from_os_release_substring() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("etc")).expect("mkdir");
        std::fs::write(dir.path().join("etc/os-release"), "NAME=Bazzite\n").expect("write");
        assert_eq!(detect_platform(dir.path()), "bazzite");
    }

    #[test]
    fn expand_home_only_touches_leading_tilde_slash() {
        let home = PathBuf::from("/home/deck");
        assert_eq!(expand_home("~/Games", &home), PathBuf::from("/home/deck/Games"));
        assert_eq!(expand_home("/abs/path", &home), PathBuf::from("/abs/path"));
    }

    #[test]
    fn lists_steam_users_excluding_zero_and_non_numeric() {
        let dir = tempfile::tempdir().expect("tempdir");
        let userdata = dir.path().join("userdata");
        std::fs::create_dir_all(userdata.join("0")).expect("mkdir");
        std::fs::create_dir_all(userdata.join("123456").join("config")).expect("mkdir");
        std::fs::write(userdata.join("123456/config/shortcuts.vdf"), b"\x00").expect("write");
        std::fs::create_dir_all(userdata.join("anon")).expect("mkdir");

        let users = list_steam_users(dir.path());
        assert_eq!(users, vec![SteamUser { id: "123456".to_string(), has_shortcuts: true }]);
    }
}
