//! Transport configuration options.
//!
//! Options are small validating appliers passed to
//! [`Transport::new`](crate::transport::Transport::new). They compose with
//! [`options`] and inputs that configure nothing (an empty endpoint, a
//! blank user agent, an empty repository list) collapse to a no-op value
//! that is skipped during construction, so presets can be shared without
//! special-casing absent settings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::clock::Clock;
use crate::transport::RoundTripper;

static OWNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*)?$").expect("owner regex"));
static REPO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((\.[a-z0-9\-.]+)|([a-z0-9\-]([a-z0-9\-.]*)?))$").expect("repo regex")
});
static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]([a-z_]*[a-z])?[:=](read|write|admin)$").expect("permission regex")
});

/// Accumulated configuration state, filled in by option appliers and
/// consumed by the transport constructor.
#[derive(Default)]
pub(crate) struct TransportBuilder {
    pub(crate) endpoint: Option<Url>,
    pub(crate) round_tripper: Option<Arc<dyn RoundTripper>>,
    pub(crate) user_agent: Option<String>,
    pub(crate) owner: Option<String>,
    pub(crate) repos: Vec<String>,
    pub(crate) installation_id: Option<u64>,
    pub(crate) scopes: Option<BTreeMap<String, String>>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
}

type Applier = Box<dyn FnOnce(&mut TransportBuilder) -> Result<(), String> + Send>;

enum Inner {
    Noop,
    Apply(Applier),
}

/// A single configuration directive for a transport.
///
/// Values are opaque; build them with the `with_*` constructors and combine
/// them with [`options`].
pub struct TransportOption {
    inner: Inner,
}

impl TransportOption {
    fn apply_fn(f: impl FnOnce(&mut TransportBuilder) -> Result<(), String> + Send + 'static) -> Self {
        Self {
            inner: Inner::Apply(Box::new(f)),
        }
    }

    fn noop() -> Self {
        Self { inner: Inner::Noop }
    }

    /// Check whether this option configures nothing.
    ///
    /// No-op options come from inputs that select the defaults, such as an
    /// empty endpoint string, and from [`options`] over all no-op entries.
    pub fn is_noop(&self) -> bool {
        matches!(self.inner, Inner::Noop)
    }

    pub(crate) fn apply(self, builder: &mut TransportBuilder) -> Result<(), String> {
        match self.inner {
            Inner::Noop => Ok(()),
            Inner::Apply(f) => f(builder),
        }
    }
}

impl std::fmt::Debug for TransportOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Inner::Noop => "Noop",
            Inner::Apply(_) => "Apply",
        };
        f.debug_struct("TransportOption").field("kind", &kind).finish()
    }
}

/// Combine several options into one.
///
/// Useful for sharing presets. Every constituent is applied in order and
/// all failures are reported together. If every entry is a no-op the result
/// is a no-op.
pub fn options(opts: impl IntoIterator<Item = TransportOption>) -> TransportOption {
    let opts: Vec<TransportOption> = opts.into_iter().collect();
    if opts.iter().all(TransportOption::is_noop) {
        return TransportOption::noop();
    }
    TransportOption::apply_fn(move |builder| {
        let mut errors = Vec::new();
        for opt in opts {
            if let Err(e) = opt.apply(builder) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    })
}

/// Use a custom REST API endpoint, for self-hosted deployments.
///
/// The URL must parse, use an http or https scheme and carry no query or
/// fragment. A path prefix is preserved when API paths are joined onto it.
/// An empty string selects the default endpoint and is a no-op.
pub fn with_endpoint(endpoint: impl Into<String>) -> TransportOption {
    let endpoint = endpoint.into();
    if endpoint.is_empty() {
        return TransportOption::noop();
    }
    TransportOption::apply_fn(move |builder| {
        let url = Url::parse(&endpoint).map_err(|e| format!("invalid endpoint url: {e}"))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(format!("invalid url scheme: {scheme} ({endpoint})")),
        }
        if !url.fragment().unwrap_or("").is_empty() || !url.query().unwrap_or("").is_empty() {
            return Err(format!(
                "endpoint cannot have fragments or queries: {endpoint}"
            ));
        }
        builder.endpoint = Some(url);
        Ok(())
    })
}

/// Use a custom inner transport for platform API calls.
///
/// This only applies to the transport's own requests (bootstrap, token
/// renewal and requests routed through it); it is the seam for injecting
/// retries, logging or a mock server.
pub fn with_round_tripper(round_tripper: Arc<dyn RoundTripper>) -> TransportOption {
    TransportOption::apply_fn(move |builder| {
        builder.round_tripper = Some(round_tripper);
        Ok(())
    })
}

/// Override the User-Agent header used for bootstrap and token renewal
/// requests. A blank value is a no-op.
pub fn with_user_agent(user_agent: impl Into<String>) -> TransportOption {
    let user_agent = user_agent.into();
    if user_agent.trim().is_empty() {
        return TransportOption::noop();
    }
    TransportOption::apply_fn(move |builder| {
        builder.user_agent = Some(user_agent);
        Ok(())
    })
}

/// Select the installation belonging to `owner` (a user or organization
/// login). The login is lowercased before validation.
pub fn with_owner(owner: impl Into<String>) -> TransportOption {
    let owner = owner.into();
    TransportOption::apply_fn(move |builder| {
        let owner = owner.to_lowercase();
        if !OWNER_RE.is_match(&owner) {
            return Err(format!("invalid owner: {owner}"));
        }
        // Owner may already have been extracted from a repository entry.
        if let Some(existing) = &builder.owner {
            if existing != &owner {
                return Err(format!("owner is already configured({existing}): {owner}"));
            }
        }
        builder.owner = Some(owner);
        Ok(())
    })
}

/// Restrict minted installation tokens to the named repositories.
///
/// Entries are `owner/repo` or bare `repo` and may be spread over several
/// calls; the accumulated list is deduplicated and sorted. When owners are
/// given they must all agree, and they fix the installation owner if
/// [`with_owner`] was not used. An empty list is a no-op.
pub fn with_repositories<I, S>(repos: I) -> TransportOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let repos: Vec<String> = repos.into_iter().map(Into::into).collect();
    if repos.is_empty() {
        return TransportOption::noop();
    }
    TransportOption::apply_fn(move |builder| {
        let mut ref_owner = builder.owner.clone();
        let mut invalid = Vec::new();
        for item in &repos {
            let item = item.to_lowercase();
            let name = match item.split_once('/') {
                Some((owner, repo)) => {
                    if !OWNER_RE.is_match(owner) {
                        invalid.push(item.clone());
                        continue;
                    }
                    match &ref_owner {
                        None => ref_owner = Some(owner.to_string()),
                        Some(existing) if existing != owner => {
                            return Err(format!(
                                "repositories from multiple owners specified: {repos:?}"
                            ));
                        }
                        _ => {}
                    }
                    repo.to_string()
                }
                None => item.clone(),
            };
            if REPO_RE.is_match(&name) {
                builder.repos.push(name);
            } else {
                invalid.push(item.clone());
            }
        }
        if !invalid.is_empty() {
            return Err(format!("invalid repositories specified: {invalid:?}"));
        }
        builder.repos.sort();
        builder.repos.dedup();
        if builder.owner.is_none() {
            builder.owner = ref_owner;
        }
        Ok(())
    })
}

/// Select the installation by id.
///
/// Useful for accessing every repository available to an installation
/// without naming them, or for building a transport from webhook metadata.
pub fn with_installation_id(id: u64) -> TransportOption {
    TransportOption::apply_fn(move |builder| {
        if id == 0 {
            return Err("installation id cannot be zero".to_string());
        }
        if let Some(existing) = builder.installation_id {
            if existing != id {
                return Err(format!(
                    "installation id is already configured({existing}): {id}"
                ));
            }
        }
        builder.installation_id = Some(id);
        Ok(())
    })
}

/// Limit minted installation tokens to the given permission scopes.
///
/// Each entry is `<scope>:<level>` or `<scope>=<level>` where level is one
/// of `read`, `write` or `admin`, for example `"issues:write"`. A later
/// call replaces the whole set. An empty list is a no-op.
pub fn with_permissions<I, S>(permissions: I) -> TransportOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let permissions: Vec<String> = permissions.into_iter().map(Into::into).collect();
    if permissions.is_empty() {
        return TransportOption::noop();
    }
    TransportOption::apply_fn(move |builder| {
        let mut scopes = BTreeMap::new();
        let mut invalid = Vec::new();
        for item in &permissions {
            let item = item.to_lowercase();
            if PERMISSION_RE.is_match(&item) {
                let item = item.replace('=', ":");
                // The regex guarantees the separator and level are present.
                if let Some((scope, level)) = item.split_once(':') {
                    scopes.insert(scope.to_string(), level.to_string());
                }
            } else {
                invalid.push(item);
            }
        }
        if !invalid.is_empty() {
            return Err(format!("invalid permissions: {invalid:?}"));
        }
        builder.scopes = Some(scopes);
        Ok(())
    })
}

/// Override the transport's time source. Crate-internal, used by tests to
/// pin expiry decisions.
pub(crate) fn with_clock(clock: Arc<dyn Clock>) -> TransportOption {
    TransportOption::apply_fn(move |builder| {
        builder.clock = Some(clock);
        Ok(())
    })
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
