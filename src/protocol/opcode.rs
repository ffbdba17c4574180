//! Opcodes for all packet types.
//!
//! The namespaces are a logging/debugging convention, not enforced by the
//! codec: agent-initiated notifications sit in 0x01-0x06, responses to
//! server commands in 0x10-0x1A, and server commands in 0x40-0x50.

// Agent -> server notifications
pub const DEVICE_CONNECTED: u8 = 0x01;
pub const HEARTBEAT: u8 = 0x02;
pub const BATTERY_STATUS: u8 = 0x03;
pub const VOLUME_STATUS: u8 = 0x04;
pub const ERROR: u8 = 0x05;
pub const FOREGROUND_APP_CHANGED: u8 = 0x06;

// Agent -> server responses to commands
pub const LAUNCH_APP_RESPONSE: u8 = 0x10;
pub const SHELL_EXECUTION_RESPONSE: u8 = 0x11;
pub const INSTALLED_APPS_RESPONSE: u8 = 0x12;
pub const PING_RESPONSE: u8 = 0x13;
pub const PACKAGE_INSTALL_RESPONSE: u8 = 0x14;
pub const UNINSTALL_APP_RESPONSE: u8 = 0x15;
pub const VOLUME_SET_RESPONSE: u8 = 0x16;
pub const DOWNLOAD_STARTED: u8 = 0x17;
pub const CLOSE_ALL_APPS_RESPONSE: u8 = 0x18;
pub const DOWNLOAD_PROGRESS: u8 = 0x19;
pub const INSTALL_PROGRESS: u8 = 0x1A;

// Server -> agent commands
pub const LAUNCH_APP: u8 = 0x40;
pub const EXECUTE_SHELL: u8 = 0x41;
pub const REQUEST_BATTERY: u8 = 0x42;
pub const REQUEST_INSTALLED_APPS: u8 = 0x43;
pub const PING: u8 = 0x45;
pub const INSTALL_PACKAGE: u8 = 0x46;
pub const INSTALL_LOCAL_PACKAGE: u8 = 0x47;
pub const SHUTDOWN: u8 = 0x48;
pub const UNINSTALL_APP: u8 = 0x49;
pub const SET_VOLUME: u8 = 0x4A;
pub const GET_VOLUME: u8 = 0x4B;
pub const CLOSE_ALL_APPS: u8 = 0x4C;
pub const CONFIGURE_DEVICE: u8 = 0x4D;
pub const CLEAR_WIFI_CREDENTIALS: u8 = 0x4E;
pub const DISPLAY_MESSAGE: u8 = 0x50;

/// Human-readable name for an opcode, for log lines.
pub fn name(opcode: u8) -> &'static str {
    match opcode {
        DEVICE_CONNECTED => "DEVICE_CONNECTED",
        HEARTBEAT => "HEARTBEAT",
        BATTERY_STATUS => "BATTERY_STATUS",
        VOLUME_STATUS => "VOLUME_STATUS",
        ERROR => "ERROR",
        FOREGROUND_APP_CHANGED => "FOREGROUND_APP_CHANGED",
        LAUNCH_APP_RESPONSE => "LAUNCH_APP_RESPONSE",
        SHELL_EXECUTION_RESPONSE => "SHELL_EXECUTION_RESPONSE",
        INSTALLED_APPS_RESPONSE => "INSTALLED_APPS_RESPONSE",
        PING_RESPONSE => "PING_RESPONSE",
        PACKAGE_INSTALL_RESPONSE => "PACKAGE_INSTALL_RESPONSE",
        UNINSTALL_APP_RESPONSE => "UNINSTALL_APP_RESPONSE",
        VOLUME_SET_RESPONSE => "VOLUME_SET_RESPONSE",
        DOWNLOAD_STARTED => "DOWNLOAD_STARTED",
        CLOSE_ALL_APPS_RESPONSE => "CLOSE_ALL_APPS_RESPONSE",
        DOWNLOAD_PROGRESS => "DOWNLOAD_PROGRESS",
        INSTALL_PROGRESS => "INSTALL_PROGRESS",
        LAUNCH_APP => "LAUNCH_APP",
        EXECUTE_SHELL => "EXECUTE_SHELL",
        REQUEST_BATTERY => "REQUEST_BATTERY",
        REQUEST_INSTALLED_APPS => "REQUEST_INSTALLED_APPS",
        PING => "PING",
        INSTALL_PACKAGE => "INSTALL_PACKAGE",
        INSTALL_LOCAL_PACKAGE => "INSTALL_LOCAL_PACKAGE",
        SHUTDOWN => "SHUTDOWN",
        UNINSTALL_APP => "UNINSTALL_APP",
        SET_VOLUME => "SET_VOLUME",
        GET_VOLUME => "GET_VOLUME",
        CLOSE_ALL_APPS => "CLOSE_ALL_APPS",
        CONFIGURE_DEVICE => "CONFIGURE_DEVICE",
        CLEAR_WIFI_CREDENTIALS => "CLEAR_WIFI_CREDENTIALS",
        DISPLAY_MESSAGE => "DISPLAY_MESSAGE",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_opcode_names() {
        assert_eq!(name(HEARTBEAT), "HEARTBEAT");
        assert_eq!(name(LAUNCH_APP), "LAUNCH_APP");
        assert_eq!(name(DISPLAY_MESSAGE), "DISPLAY_MESSAGE");
    }

    #[test]
    fn test_unknown_opcode_name() {
        assert_eq!(name(0xFF), "UNKNOWN");
        assert_eq!(name(0x44), "UNKNOWN");
    }
}
