use anyhow::Result;

/// Priority used when a plugin does not declare one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// A named text transform applied around generation.
///
/// Lower priority values run first. Both hooks default to the identity, so a
/// plugin only implements the phase it cares about. Hooks are synchronous and
/// must not block on I/O.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Transform the user input before it reaches the provider.
    fn pre_process(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    /// Transform generated text (a full answer or a single fragment).
    fn post_process(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    fn validate_config(&self) -> bool {
        true
    }
}
