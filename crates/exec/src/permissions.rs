use std::sync::Arc;

use hostagent_config::PermissionLevel;
use tracing::debug;

use crate::privilege::{PrivilegeBroker, SystemPrivileges};

/// Tier required by every known tool.  Anything not listed needs
/// [`PermissionLevel::Advanced`].
pub const TOOL_PERMISSIONS: &[(&str, PermissionLevel)] = &[
    // Read-only queries.
    ("read_file", PermissionLevel::Basic),
    ("list_directory", PermissionLevel::Basic),
    ("search_files", PermissionLevel::Basic),
    ("get_file_info", PermissionLevel::Basic),
    ("list_processes", PermissionLevel::Basic),
    ("get_process_info", PermissionLevel::Basic),
    ("open_url", PermissionLevel::Basic),
    ("search_web", PermissionLevel::Basic),
    ("capture_screenshot", PermissionLevel::Basic),
    ("describe_screen", PermissionLevel::Basic),
    ("get_screen_size", PermissionLevel::Basic),
    ("get_pixel_color", PermissionLevel::Basic),
    ("locate_image_on_screen", PermissionLevel::Basic),
    ("get_system_info", PermissionLevel::Basic),
    ("echo", PermissionLevel::Basic),
    ("get_time", PermissionLevel::Basic),
    // Writes and input automation.
    ("write_file", PermissionLevel::Advanced),
    ("move_file", PermissionLevel::Advanced),
    ("launch_application", PermissionLevel::Advanced),
    ("click_mouse", PermissionLevel::Advanced),
    ("type_text", PermissionLevel::Advanced),
    ("press_key", PermissionLevel::Advanced),
    ("hotkey", PermissionLevel::Advanced),
    ("drag_mouse", PermissionLevel::Advanced),
    ("move_mouse", PermissionLevel::Advanced),
    ("scroll_mouse", PermissionLevel::Advanced),
    ("read_registry_key", PermissionLevel::Advanced),
    ("get_environment_variable", PermissionLevel::Advanced),
    // Destructive or system-wide.
    ("delete_file", PermissionLevel::Admin),
    ("kill_process", PermissionLevel::Admin),
    ("write_registry_key", PermissionLevel::Admin),
    ("delete_registry_key", PermissionLevel::Admin),
    ("windows_shutdown", PermissionLevel::Admin),
    ("windows_service_control", PermissionLevel::Admin),
    ("windows_volume_control", PermissionLevel::Admin),
    ("set_environment_variable", PermissionLevel::Admin),
    ("linux_systemd_control", PermissionLevel::Admin),
    ("linux_service_control", PermissionLevel::Admin),
    ("linux_service_status", PermissionLevel::Admin),
    ("linux_package_manager", PermissionLevel::Admin),
    ("macos_system_preferences", PermissionLevel::Admin),
    ("macos_service_control", PermissionLevel::Admin),
];

pub const DEFAULT_TOOL_LEVEL: PermissionLevel = PermissionLevel::Advanced;

/// Compares the tier a tool needs against the configured tier.
///
/// The configured level is fixed for the lifetime of the manager; OS
/// elevation never raises it.
pub struct PermissionManager {
    level: PermissionLevel,
    broker: Arc<dyn PrivilegeBroker>,
}

impl PermissionManager {
    pub fn new(level: PermissionLevel) -> Self {
        Self::with_broker(level, Arc::new(SystemPrivileges))
    }

    pub fn with_broker(level: PermissionLevel, broker: Arc<dyn PrivilegeBroker>) -> Self {
        Self { level, broker }
    }

    pub fn current_level(&self) -> PermissionLevel {
        self.level
    }

    pub fn required_level(&self, tool_name: &str) -> PermissionLevel {
        TOOL_PERMISSIONS
            .iter()
            .find(|(name, _)| *name == tool_name)
            .map(|(_, level)| *level)
            .unwrap_or(DEFAULT_TOOL_LEVEL)
    }

    /// `true` when the configured tier is at least `required` (looked up from
    /// the table when `None`).
    pub fn check(&self, tool_name: &str, required: Option<PermissionLevel>) -> bool {
        let required = required.unwrap_or_else(|| self.required_level(tool_name));
        let allowed = self.level >= required;
        debug!(
            tool = tool_name,
            required = %required,
            current = %self.level,
            allowed,
            "permission check"
        );
        allowed
    }

    pub fn is_elevated(&self) -> bool {
        self.broker.is_elevated()
    }

    pub async fn request_elevation(&self) -> bool {
        if self.broker.is_elevated() {
            return true;
        }
        self.broker.request_elevation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::FixedPrivileges;

    const ALL: [PermissionLevel; 3] = [
        PermissionLevel::Basic,
        PermissionLevel::Advanced,
        PermissionLevel::Admin,
    ];

    fn manager(level: PermissionLevel) -> PermissionManager {
        PermissionManager::with_broker(level, Arc::new(FixedPrivileges::refusing()))
    }

    #[test]
    fn table_lookups() {
        let pm = manager(PermissionLevel::Basic);
        assert_eq!(pm.required_level("read_file"), PermissionLevel::Basic);
        assert_eq!(pm.required_level("type_text"), PermissionLevel::Advanced);
        assert_eq!(pm.required_level("delete_file"), PermissionLevel::Admin);
        assert_eq!(pm.required_level("linux_service_status"), PermissionLevel::Admin);
    }

    #[test]
    fn unknown_tool_defaults_to_advanced() {
        let pm = manager(PermissionLevel::Basic);
        assert_eq!(pm.required_level("brand_new_tool"), PermissionLevel::Advanced);
        assert!(!pm.check("brand_new_tool", None));
        assert!(manager(PermissionLevel::Advanced).check("brand_new_tool", None));
    }

    #[test]
    fn check_is_rank_comparison() {
        for current in ALL {
            let pm = manager(current);
            for required in ALL {
                assert_eq!(
                    pm.check("anything", Some(required)),
                    current.rank() >= required.rank(),
                    "current={current} required={required}"
                );
            }
        }
    }

    #[test]
    fn table_has_no_duplicates() {
        let mut names: Vec<_> = TOOL_PERMISSIONS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[tokio::test]
    async fn elevation_does_not_change_configured_level() {
        let pm = PermissionManager::with_broker(
            PermissionLevel::Advanced,
            Arc::new(FixedPrivileges::granting()),
        );
        assert!(pm.request_elevation().await);
        assert_eq!(pm.current_level(), PermissionLevel::Advanced);
        assert!(!pm.check("delete_file", None));
    }

    #[tokio::test]
    async fn already_elevated_short_circuits() {
        let pm = PermissionManager::with_broker(
            PermissionLevel::Basic,
            Arc::new(FixedPrivileges {
                elevated: true,
                grant: false,
            }),
        );
        assert!(pm.is_elevated());
        assert!(pm.request_elevation().await);
    }
}
