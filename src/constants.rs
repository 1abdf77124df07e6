// -
// Coordination store layout

/// Namespace all partition users live under
pub(crate) const DEFAULT_ROOT: &str = "/npm_cache_share";

/// Separator of package identifiers inside a module node value
pub(crate) const PACKAGE_SEPARATOR: char = ',';

/// Separator of the platform qualifier in `name@version+platform`
pub(crate) const PLATFORM_SEPARATOR: char = '+';

/// Escape for `/` inside a single node name (scoped module names)
pub(crate) const ESCAPED_SLASH: &str = "%2F";

// -
// Environment

pub(crate) const CONFIG_ENV_PREFIX: &str = "MIRROR";
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
