//! Translation lookup
//!
//! A two-level table: module name, then key, then a formatter. Lookups never
//! fail; a missing module or key renders as the key name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named arguments substituted into a message
pub type Args<'a> = &'a [(&'a str, &'a str)];

/// Renders one message
pub type Formatter = Arc<dyn Fn(Args<'_>) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct Catalog {
    modules: HashMap<String, HashMap<String, Formatter>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formatter
    pub fn insert<F>(&mut self, module: &str, key: &str, formatter: F)
    where
        F: Fn(Args<'_>) -> String + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(key.to_string(), Arc::new(formatter));
    }

    /// Register a `{name}` placeholder template
    pub fn insert_template(&mut self, module: &str, key: &str, template: &str) {
        let template = template.to_string();
        self.insert(module, key, move |args| render(&template, args));
    }

    /// Build a catalog from `(module, key, template)` triples
    pub fn from_templates<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut catalog = Self::new();
        for (module, key, template) in entries {
            catalog.insert_template(module, key, template);
        }
        catalog
    }

    pub fn contains(&self, module: &str, key: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|keys| keys.contains_key(key))
    }

    /// Render a message, falling back to the key name
    pub fn lookup(&self, module: &str, key: &str, args: Args<'_>) -> String {
        match self.modules.get(module).and_then(|keys| keys.get(key)) {
            Some(formatter) => formatter(args),
            None => key.to_string(),
        }
    }

    /// Render a message without arguments
    pub fn text(&self, module: &str, key: &str) -> String {
        self.lookup(module, key, &[])
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&String, usize)> =
            self.modules.iter().map(|(m, keys)| (m, keys.len())).collect();
        counts.sort();
        f.debug_struct("Catalog").field("modules", &counts).finish()
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are kept verbatim.
fn render(template: &str, args: Args<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match args.iter().find(|(k, _)| *k == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
