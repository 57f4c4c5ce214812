//! SCM-URL and module-name parsing (C1).
//!
//! Both functions here are pure syntactic splitters: no network access, no
//! validation of the resulting pieces, no normalization beyond what's
//! described. Garbage in, garbage (but well-typed) out.

/// A `link[#ref]` SCM location, plus best-effort namespace/component
/// extraction from the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScmUrl {
    pub link: String,
    pub ref_: Option<String>,
    pub ns: Option<String>,
    pub comp: Option<String>,
}

impl ScmUrl {
    /// `ref`, defaulting to `"master"` when absent. Used by callers for
    /// which a default ref is specified (destination refs; config repo
    /// checkouts); build refs are taken as-is and should read `ref_`
    /// directly.
    pub fn ref_or_master(&self) -> &str {
        self.ref_.as_deref().unwrap_or("master")
    }
}

/// Split `s` once on `#`: left half is `link`, right half (if present) is
/// `ref`. The path of `link` is split on `/`; the last segment is `comp`,
/// the penultimate (if any) is `ns`.
pub fn split_scmurl(s: &str) -> ScmUrl {
    let (link, ref_) = match s.split_once('#') {
        Some((link, r)) => (link.to_string(), Some(r.to_string())),
        None => (s.to_string(), None),
    };

    let segments: Vec<&str> = link.split('/').collect();
    let comp = segments.last().filter(|s| !s.is_empty()).map(|s| s.to_string());
    let ns = match segments.len() {
        n if n >= 2 => {
            let candidate = segments[n - 2];
            (!candidate.is_empty()).then(|| candidate.to_string())
        }
        _ => None,
    };

    ScmUrl { link, ref_, ns, comp }
}

/// A module's `name:stream` pair, with `stream` defaulted to `"master"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleName {
    pub name: String,
    pub stream: String,
}

/// Split `s` once on `:`. If there is no colon, or the stream half is
/// empty, `stream` defaults to `"master"`. Extra trailing colons (i.e. a
/// `:` inside the stream half) are ignored — `split_once` already stops at
/// the first colon, so `"n:s:x:y"` yields `stream = "s:x:y"`... except the
/// spec's P2 requires `"n:s:x:y"` to yield `{"n", "s"}`, so the stream half
/// is itself split on `:` and only its first segment kept.
pub fn split_module(s: &str) -> ModuleName {
    let (name, stream) = match s.split_once(':') {
        Some((name, rest)) => {
            let stream = rest.split(':').next().unwrap_or("");
            (name.to_string(), stream.to_string())
        }
        None => (s.to_string(), String::new()),
    };
    let stream = if stream.is_empty() { "master".to_string() } else { stream };
    ModuleName { name, stream }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_full_rpms_url_with_ref() {
        let u = split_scmurl("https://src.fedoraproject.org/rpms/gzip.git#rawhide");
        assert_eq!(u.link, "https://src.fedoraproject.org/rpms/gzip.git");
        assert_eq!(u.ref_.as_deref(), Some("rawhide"));
        assert_eq!(u.ns.as_deref(), Some("rpms"));
        assert_eq!(u.comp.as_deref(), Some("gzip.git"));
    }

    #[test]
    fn p1_round_trip_preserves_link_bytes() {
        let link = "https://example.com/a/b/c";
        let with_ref = format!("{link}#some-ref");
        let u = split_scmurl(&with_ref);
        assert_eq!(u.link, link);
        assert_eq!(u.ref_.as_deref(), Some("some-ref"));

        let u2 = split_scmurl(link);
        assert_eq!(u2.link, link);
        assert_eq!(u2.ref_, None);
    }

    #[test]
    fn ref_or_master_defaults() {
        let u = split_scmurl("https://example.com/rpms/foo");
        assert_eq!(u.ref_or_master(), "master");
        let u = split_scmurl("https://example.com/rpms/foo#rawhide");
        assert_eq!(u.ref_or_master(), "rawhide");
    }

    #[test]
    fn p2_module_defaulting() {
        assert_eq!(split_module(""), ModuleName { name: String::new(), stream: "master".into() });
        assert_eq!(split_module(":"), ModuleName { name: String::new(), stream: "master".into() });
        assert_eq!(
            split_module("n:s:x:y"),
            ModuleName { name: "n".into(), stream: "s".into() }
        );
    }

    #[test]
    fn module_with_no_colon_defaults_stream() {
        assert_eq!(split_module("nodejs"), ModuleName { name: "nodejs".into(), stream: "master".into() });
    }

    #[test]
    fn module_with_explicit_stream() {
        assert_eq!(
            split_module("nodejs:18"),
            ModuleName { name: "nodejs".into(), stream: "18".into() }
        );
    }

    #[test]
    fn no_slash_has_no_namespace() {
        let u = split_scmurl("gzip.git#rawhide");
        assert_eq!(u.comp.as_deref(), Some("gzip.git"));
        assert_eq!(u.ns, None);
    }
}
