//! Template expansion for `defaults.*` strings.
//!
//! The configuration schema's templates use Python `%`-style placeholders
//! (`%(component)s`, and for modules `%(stream)s`), not the `{{ }}` Jinja2
//! syntax — this is a data format inherited from the service being ported,
//! not a choice made for this crate, so it is reproduced literally rather
//! than translated to a Rust-ecosystem templating syntax.
//!
//! `%(component)s` is the raw component key (`name:stream` for modules,
//! verbatim); `%(stream)s` is the module's parsed stream, empty for `rpms`.

/// Substitute `%(component)s` with `component` and `%(stream)s` with
/// `stream` in `template`. Any other `%(...)s` placeholder, or a bare `%`,
/// is left untouched — the schema defines exactly these two names.
pub fn expand(template: &str, component: &str, stream: &str) -> String {
    template.replace("%(component)s", component).replace("%(stream)s", stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_component_placeholder() {
        assert_eq!(expand("rpms/%(component)s", "gzip", ""), "rpms/gzip");
    }

    #[test]
    fn substitutes_both_placeholders_for_modules() {
        assert_eq!(
            expand("modules/%(component)s/%(stream)s", "nodejs", "18"),
            "modules/nodejs/18"
        );
    }

    #[test]
    fn leaves_template_without_placeholders_unchanged() {
        assert_eq!(expand("static/path", "gzip", ""), "static/path");
    }

    #[test]
    fn repeated_placeholder_substituted_everywhere() {
        assert_eq!(
            expand("%(component)s-%(component)s", "gzip", ""),
            "gzip-gzip"
        );
    }
}
