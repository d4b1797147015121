//! Per-user templating of volume paths and names

use std::sync::Arc;

/// Placeholder replaced by the user name in the default formatter
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// What a volume-name template can refer to
#[derive(Debug, Clone, Copy)]
pub struct VolumeNameContext<'a> {
    pub user: &'a str,
    pub app_id: &'a str,
}

type FormatFn = dyn Fn(&str, &VolumeNameContext<'_>) -> String + Send + Sync;

/// Pluggable `(template, context) -> String` used for container paths,
/// host paths and external volume names.
#[derive(Clone)]
pub struct VolumeNameFormatter(Arc<FormatFn>);

impl VolumeNameFormatter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &VolumeNameContext<'_>) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn format(&self, template: &str, ctx: &VolumeNameContext<'_>) -> String {
        (self.0)(template, ctx)
    }
}

impl Default for VolumeNameFormatter {
    fn default() -> Self {
        Self::new(default_format_volume_name)
    }
}

impl std::fmt::Debug for VolumeNameFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VolumeNameFormatter(..)")
    }
}

pub fn default_format_volume_name(template: &str, ctx: &VolumeNameContext<'_>) -> String {
    template.replace(USERNAME_PLACEHOLDER, ctx.user)
}
