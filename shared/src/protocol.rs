/// Version of the result envelope understood by the browser extensions
pub const PROTOCOL_VERSION: u32 = 2;

/// DNS-SD service type browsed by default
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp";

/// DNS-SD browse domain
pub const DEFAULT_DOMAIN: &str = "local";

/// Native-messaging host name registered with the browsers
pub const HOST_NAME: &str = "com.railduino.zeroconf_lookup";

/// The only command the extensions send
pub const LOOKUP_COMMAND: &str = "Lookup";

/// DAAP (iTunes music sharing) port and the tag prepended to its TXT list
pub const DAAP_PORT: u16 = 3689;
pub const DAAP_TAG: &str = "DAAP (iTunes) Server";
