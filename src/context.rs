//! Process-wide link slot
//!
//! For hosts that cannot thread a `Link` through their component tree.
//! Explicitly constructed links work the same; this only stores a clone.

use std::sync::OnceLock;

use crate::config::LinkConfig;
use crate::link::Link;
use crate::types::LinkResult;

/// Global link instance (initialized once at startup)
static LINK: OnceLock<Link> = OnceLock::new();

/// Build and install the global link. Later calls return the installed one
/// and ignore `config`.
pub fn init_link(config: LinkConfig) -> LinkResult<&'static Link> {
    if let Some(link) = LINK.get() {
        return Ok(link);
    }
    let link = Link::new(config)?;
    Ok(LINK.get_or_init(|| link))
}

/// Get the global link (returns None if not initialized)
pub fn link() -> Option<&'static Link> {
    LINK.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        let first = init_link(LinkConfig::new("http://localhost:7001")).unwrap();
        let second = init_link(LinkConfig::new("http://localhost:7002")).unwrap();
        assert_eq!(first.config().origin, second.config().origin);
        assert!(link().is_some());
    }
}
