use crate::{Environment, NoProxy, ProxyEndpoint, ProxyPolicy, Scheme};

const PLAIN_CANDIDATES: &[&str] = &["HTTP_PROXY", "ALL_PROXY"];
const SECURE_CANDIDATES: &[&str] = &["HTTPS_PROXY", "ALL_PROXY"];

/// Variables consulted for `scheme`, highest priority first
pub fn candidates(scheme: Scheme) -> &'static [&'static str] {
    match scheme {
        Scheme::Plain => PLAIN_CANDIDATES,
        Scheme::Secure => SECURE_CANDIDATES,
    }
}

/// Resolve the SOCKS proxy for `scheme` from the current process environment.
///
/// The environment is read on every call.
pub fn resolve_proxy(scheme: Scheme) -> Option<ProxyEndpoint> {
    resolve_proxy_in(scheme, &Environment::snapshot())
}

/// Resolve the SOCKS proxy for `scheme` from an explicit snapshot.
///
/// The first candidate variable holding a usable SOCKS URI wins. Missing, malformed
/// and non-SOCKS values are skipped, so a bad `HTTPS_PROXY` still lets `ALL_PROXY` apply.
pub fn resolve_proxy_in(scheme: Scheme, env: &Environment) -> Option<ProxyEndpoint> {
    let proxy = candidates(scheme)
        .iter()
        .find_map(|name| candidate(env, name));

    match &proxy {
        Some(proxy) => tracing::debug!(?scheme, %proxy, "proxy resolved"),
        None => tracing::trace!(?scheme, "no proxy configured"),
    }
    proxy
}

fn candidate(env: &Environment, name: &str) -> Option<ProxyEndpoint> {
    let value = env.lookup(name)?;
    match value.parse::<ProxyEndpoint>() {
        Ok(proxy) => Some(proxy),
        Err(reason) => {
            tracing::debug!(variable = name, %reason, "ignoring proxy variable");
            None
        }
    }
}

/// Like [`resolve_proxy`], then drops the proxy if `NO_PROXY` excludes `host`
pub fn resolve_proxy_for_host(scheme: Scheme, host: &str) -> Option<ProxyEndpoint> {
    let env = Environment::snapshot();
    resolve_proxy_for_host_in(scheme, host, &env, &NoProxy::from_env(&env))
}

/// Resolve from `env`, letting `policy` veto the result for `host`
pub fn resolve_proxy_for_host_in(
    scheme: Scheme,
    host: &str,
    env: &Environment,
    policy: &impl ProxyPolicy,
) -> Option<ProxyEndpoint> {
    let proxy = resolve_proxy_in(scheme, env)?;
    if policy.is_proxy_permitted_for_host(host) {
        Some(proxy)
    } else {
        tracing::debug!(host, %proxy, "proxy bypassed for host");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyKind;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        Environment::from_pairs(pairs.iter().copied())
    }

    fn endpoint(host: &str, port: u16, kind: ProxyKind) -> ProxyEndpoint {
        ProxyEndpoint {
            host: host.to_string(),
            port,
            kind,
        }
    }

    #[test]
    fn plain_uses_http_proxy() {
        let env = env(&[("HTTP_PROXY", "socks5://proxy.example:1080")]);
        assert_eq!(
            resolve_proxy_in(Scheme::Plain, &env),
            Some(endpoint("proxy.example", 1080, ProxyKind::Socks5))
        );
    }

    #[test]
    fn secure_falls_back_to_all_proxy() {
        let env = env(&[("ALL_PROXY", "socks4://p:1081")]);
        assert_eq!(
            resolve_proxy_in(Scheme::Secure, &env),
            Some(endpoint("p", 1081, ProxyKind::Socks4))
        );
    }

    #[test]
    fn secure_ignores_http_proxy() {
        let env = env(&[("HTTP_PROXY", "socks5://plain:1080")]);
        assert_eq!(resolve_proxy_in(Scheme::Secure, &env), None);
    }

    #[test]
    fn plain_ignores_https_proxy() {
        let env = env(&[("HTTPS_PROXY", "socks5://secure:1080")]);
        assert_eq!(resolve_proxy_in(Scheme::Plain, &env), None);
    }

    #[test]
    fn forward_proxy_is_not_a_proxy() {
        let env = env(&[("HTTPS_PROXY", "http://p:8080")]);
        assert_eq!(resolve_proxy_in(Scheme::Secure, &env), None);
    }

    #[test]
    fn missing_port_is_not_a_proxy() {
        let env = env(&[("HTTP_PROXY", "socks5://p")]);
        assert_eq!(resolve_proxy_in(Scheme::Plain, &env), None);
    }

    #[test]
    fn nothing_set() {
        let env = env(&[("PATH", "/usr/bin")]);
        assert_eq!(resolve_proxy_in(Scheme::Plain, &env), None);
        assert_eq!(resolve_proxy_in(Scheme::Secure, &env), None);
    }

    #[test]
    fn scheme_specific_beats_all_proxy() {
        let env = env(&[
            ("ALL_PROXY", "socks5://all:1"),
            ("HTTP_PROXY", "socks5://http:2"),
            ("HTTPS_PROXY", "socks5://https:3"),
        ]);
        assert_eq!(
            resolve_proxy_in(Scheme::Plain, &env),
            Some(endpoint("http", 2, ProxyKind::Socks5))
        );
        assert_eq!(
            resolve_proxy_in(Scheme::Secure, &env),
            Some(endpoint("https", 3, ProxyKind::Socks5))
        );
    }

    #[test]
    fn invalid_scheme_specific_falls_through_to_all_proxy() {
        for bad in ["http://corp:3128", "socks5://nope", "socks5://h:port", "::::", ""] {
            let env = env(&[("HTTPS_PROXY", bad), ("ALL_PROXY", "socks5://all:1080")]);
            assert_eq!(
                resolve_proxy_in(Scheme::Secure, &env),
                Some(endpoint("all", 1080, ProxyKind::Socks5)),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn variable_names_are_case_insensitive() {
        let env = env(&[("all_Proxy", "socks5://mixed:1080")]);
        assert_eq!(
            resolve_proxy_in(Scheme::Plain, &env),
            Some(endpoint("mixed", 1080, ProxyKind::Socks5))
        );
    }

    #[test]
    fn policy_can_veto() {
        let env = env(&[
            ("ALL_PROXY", "socks5://all:1080"),
            ("NO_PROXY", "internal.example"),
        ]);
        let policy = NoProxy::from_env(&env);

        assert_eq!(
            resolve_proxy_for_host_in(Scheme::Plain, "api.internal.example", &env, &policy),
            None
        );
        assert_eq!(
            resolve_proxy_for_host_in(Scheme::Plain, "public.example", &env, &policy),
            Some(endpoint("all", 1080, ProxyKind::Socks5))
        );
    }

    #[test]
    fn candidate_order() {
        assert_eq!(candidates(Scheme::Plain), ["HTTP_PROXY", "ALL_PROXY"]);
        assert_eq!(candidates(Scheme::Secure), ["HTTPS_PROXY", "ALL_PROXY"]);
    }
}
