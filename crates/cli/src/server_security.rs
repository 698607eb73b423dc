use anyhow::{Context as AnyhowContext, Result};
use std::net::SocketAddr;

pub(crate) const AUTH_TOKEN_ENV: &str = "DATAREC_AUTH_TOKEN";

#[derive(Clone, Debug)]
pub(crate) struct AuthToken {
    token: String,
}

impl AuthToken {
    pub(crate) fn parse(raw: Option<&str>) -> Result<Option<Self>> {
        let Some(raw) = raw else {
            return Ok(None);
        };

        let token = raw.trim();
        if token.is_empty() {
            anyhow::bail!("auth token must be non-empty")
        }

        Ok(Some(Self {
            token: token.to_string(),
        }))
    }

    /// Flag value, else `DATAREC_AUTH_TOKEN`.
    pub(crate) fn resolve(flag: Option<&str>) -> Result<Option<Self>> {
        let env_value = std::env::var(AUTH_TOKEN_ENV).ok();
        Self::parse(flag.or(env_value.as_deref()))
    }

    pub(crate) fn matches_http_authorization_header(&self, header_value: &str) -> bool {
        // Only "Bearer <token>" is accepted.
        let header_value = header_value.trim();
        let Some(rest) = header_value.strip_prefix("Bearer ") else {
            return false;
        };
        constant_time_eq(rest.trim(), &self.token)
    }
}

pub(crate) async fn resolve_guarded_bind_addrs(
    bind: &str,
    public: bool,
) -> Result<Vec<SocketAddr>> {
    let addrs = resolve_bind_addrs(bind).await?;
    enforce_bind_guard_for_addrs(bind, &addrs, public)?;
    Ok(addrs)
}

async fn resolve_bind_addrs(bind: &str) -> Result<Vec<SocketAddr>> {
    // Tokio resolution so "localhost" works.
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();

    if addrs.is_empty() {
        anyhow::bail!("Bind address resolved to zero socket addrs: {bind}")
    }
    Ok(addrs)
}

fn enforce_bind_guard_for_addrs(bind: &str, addrs: &[SocketAddr], public: bool) -> Result<()> {
    let any_non_loopback = addrs.iter().any(|addr| !addr.ip().is_loopback());
    if any_non_loopback && !public {
        anyhow::bail!(
            "Refusing to bind to non-loopback address without --public: {bind}. To expose the recommender API, pass --public and set DATAREC_AUTH_TOKEN (or --auth-token)."
        )
    }
    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
