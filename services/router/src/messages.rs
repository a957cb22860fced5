//! Locale-resolved disconnect messages.
//!
//! Language lookup is case-insensitive with `_` normalized to `-`; the
//! full tag is tried first, then the base language, then the default
//! table. Templates substitute `${sni}` and `${error}`.

use std::collections::HashMap;

use hyrp_routing::RouteError;
use serde::{Deserialize, Serialize};

use crate::config::MessagesConfig;

/// Default disconnect templates, one per routing failure class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectMessages {
    pub no_route: String,
    pub no_backends: String,
    pub routing_error: String,
    pub discovery_error: String,
}

impl Default for DisconnectMessages {
    fn default() -> Self {
        DisconnectMessages {
            no_route: "The server is currently unavailable.".into(),
            no_backends: "The server is full or restarting. Please try again in a moment.".into(),
            routing_error: "The server is currently unreachable. Please try again later.".into(),
            discovery_error:
                "The server is looking for an available instance. Please try again in a moment."
                    .into(),
        }
    }
}

/// Per-locale partial overrides; empty fields fall through to the
/// default table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectOverrides {
    pub no_route: String,
    pub no_backends: String,
    pub routing_error: String,
    pub discovery_error: String,
}

/// Built-in locale tables applied when the configuration defines none.
pub fn builtin_locales() -> HashMap<String, DisconnectOverrides> {
    let entry = |no_route: &str, no_backends: &str, routing_error: &str, discovery_error: &str| {
        DisconnectOverrides {
            no_route: no_route.into(),
            no_backends: no_backends.into(),
            routing_error: routing_error.into(),
            discovery_error: discovery_error.into(),
        }
    };
    HashMap::from([
        (
            "de".to_string(),
            entry(
                "Der Server ist aktuell nicht verfügbar.",
                "Der Server ist gerade voll oder startet neu. Bitte versuche es gleich erneut.",
                "Der Server ist aktuell nicht erreichbar. Bitte versuche es später erneut.",
                "Der Server sucht gerade eine freie Instanz. Bitte versuche es gleich erneut.",
            ),
        ),
        (
            "fr".to_string(),
            entry(
                "Le serveur est actuellement indisponible.",
                "Le serveur est plein ou redémarre. Réessaie dans un instant.",
                "Le serveur est actuellement inaccessible. Réessaie plus tard.",
                "Le serveur cherche une instance disponible. Réessaie dans un instant.",
            ),
        ),
        (
            "es".to_string(),
            entry(
                "El servidor no está disponible en este momento.",
                "El servidor está lleno o reiniciándose. Inténtalo de nuevo en un momento.",
                "No se puede acceder al servidor en este momento. Inténtalo más tarde.",
                "El servidor está buscando una instancia disponible. Inténtalo de nuevo en un momento.",
            ),
        ),
        (
            "pt".to_string(),
            entry(
                "O servidor não está disponível no momento.",
                "O servidor está cheio ou reiniciando. Tente novamente em instantes.",
                "Não foi possível acessar o servidor no momento. Tente novamente mais tarde.",
                "O servidor está procurando uma instância disponível. Tente novamente em instantes.",
            ),
        ),
        (
            "pt-BR".to_string(),
            entry(
                "O servidor está indisponível no momento.",
                "O servidor está cheio ou reiniciando. Tente novamente em instantes.",
                "O servidor está inacessível no momento. Tente novamente mais tarde.",
                "O servidor está procurando uma instância disponível. Tente novamente em instantes.",
            ),
        ),
        (
            "it".to_string(),
            entry(
                "Il server non è disponibile al momento.",
                "Il server è pieno o si sta riavviando. Riprova tra un momento.",
                "Il server non è raggiungibile al momento. Riprova più tardi.",
                "Il server sta cercando un'istanza disponibile. Riprova tra un momento.",
            ),
        ),
    ])
}

/// Effective disconnect templates for a client language.
pub fn messages_for_language(cfg: &MessagesConfig, language: &str) -> DisconnectMessages {
    let mut base = cfg.disconnect.clone();
    if cfg.disconnect_locales.is_empty() {
        return base;
    }

    let lang = language.trim();
    if lang.is_empty() {
        return base;
    }
    let lang = lang.replace('_', "-");
    let base_lang = lang.split('-').next().unwrap_or(&lang).to_string();

    let overrides = lookup_locale(&cfg.disconnect_locales, &lang)
        .or_else(|| lookup_locale(&cfg.disconnect_locales, &base_lang));
    let Some(overrides) = overrides else {
        return base;
    };

    if !overrides.no_route.trim().is_empty() {
        base.no_route = overrides.no_route.clone();
    }
    if !overrides.no_backends.trim().is_empty() {
        base.no_backends = overrides.no_backends.clone();
    }
    if !overrides.routing_error.trim().is_empty() {
        base.routing_error = overrides.routing_error.clone();
    }
    if !overrides.discovery_error.trim().is_empty() {
        base.discovery_error = overrides.discovery_error.clone();
    }
    base
}

fn lookup_locale<'a>(
    locales: &'a HashMap<String, DisconnectOverrides>,
    key: &str,
) -> Option<&'a DisconnectOverrides> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    locales
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// The user-visible disconnect reason for a failed routing outcome.
pub fn disconnect_reason(
    cfg: &MessagesConfig,
    sni: &str,
    language: &str,
    route_err: Option<&RouteError>,
) -> String {
    let messages = messages_for_language(cfg, language);
    let (template, fallback) = match route_err {
        None => (messages.no_route, "no route"),
        Some(RouteError::NoBackends) => (messages.no_backends, "no backends"),
        Some(e) if e.is_discovery() => (messages.discovery_error, "discovery error"),
        Some(_) => (messages.routing_error, "routing error"),
    };
    let template = if template.trim().is_empty() {
        fallback.to_string()
    } else {
        template
    };
    format_template(&template, sni, route_err)
}

fn format_template(template: &str, sni: &str, err: Option<&RouteError>) -> String {
    let error = err.map(|e| e.to_string()).unwrap_or_default();
    template.replace("${sni}", sni).replace("${error}", &error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_locale(lang: &str, routing_error: &str) -> MessagesConfig {
        MessagesConfig {
            disconnect: DisconnectMessages {
                routing_error: "EN ${sni}".into(),
                ..DisconnectMessages::default()
            },
            disconnect_locales: HashMap::from([(
                lang.to_string(),
                DisconnectOverrides {
                    routing_error: routing_error.into(),
                    ..DisconnectOverrides::default()
                },
            )]),
        }
    }

    #[test]
    fn full_tag_falls_back_to_base_language() {
        let cfg = cfg_with_locale("de", "DE ${sni}");
        let reason = disconnect_reason(
            &cfg,
            "example",
            "de-AT",
            Some(&RouteError::UnknownStrategy("x".into())),
        );
        assert_eq!(reason, "DE example");
    }

    #[test]
    fn full_tag_wins_over_base() {
        let mut cfg = cfg_with_locale("de", "DE ${sni}");
        cfg.disconnect_locales.insert(
            "de-AT".into(),
            DisconnectOverrides {
                routing_error: "AT ${sni}".into(),
                ..DisconnectOverrides::default()
            },
        );
        let reason = disconnect_reason(
            &cfg,
            "example",
            "de-AT",
            Some(&RouteError::UnknownStrategy("x".into())),
        );
        assert_eq!(reason, "AT example");
    }

    #[test]
    fn lookup_is_case_insensitive_and_underscore_tolerant() {
        let cfg = cfg_with_locale("pt-BR", "BR ${sni}");
        let reason = disconnect_reason(
            &cfg,
            "x",
            "PT_br",
            Some(&RouteError::UnknownStrategy("x".into())),
        );
        assert_eq!(reason, "BR x");
    }

    #[test]
    fn unknown_language_uses_defaults() {
        let cfg = cfg_with_locale("de", "DE ${sni}");
        let reason = disconnect_reason(
            &cfg,
            "example",
            "ja-JP",
            Some(&RouteError::UnknownStrategy("x".into())),
        );
        assert_eq!(reason, "EN example");
    }

    #[test]
    fn empty_locale_field_falls_through() {
        let mut cfg = cfg_with_locale("de", "DE ${sni}");
        // The locale does not override no_backends, so the default text
        // must survive.
        cfg.disconnect.no_backends = "EN full".into();
        let reason = disconnect_reason(&cfg, "x", "de-DE", Some(&RouteError::NoBackends));
        assert_eq!(reason, "EN full");
    }

    #[test]
    fn reason_classes_map_to_templates() {
        let cfg = MessagesConfig {
            disconnect: DisconnectMessages {
                no_route: "NR".into(),
                no_backends: "NB".into(),
                routing_error: "RE ${error}".into(),
                discovery_error: "DE".into(),
            },
            disconnect_locales: HashMap::new(),
        };
        assert_eq!(disconnect_reason(&cfg, "s", "", None), "NR");
        assert_eq!(
            disconnect_reason(&cfg, "s", "", Some(&RouteError::NoBackends)),
            "NB"
        );
        assert_eq!(
            disconnect_reason(&cfg, "s", "", Some(&RouteError::DiscoveryNotSet)),
            "DE"
        );
        assert_eq!(
            disconnect_reason(
                &cfg,
                "s",
                "",
                Some(&RouteError::InvalidDiscoveryMode("x".into()))
            ),
            "DE"
        );
        assert_eq!(
            disconnect_reason(&cfg, "s", "", Some(&RouteError::UnknownStrategy("y".into()))),
            "RE unknown strategy \"y\""
        );
    }

    #[test]
    fn empty_template_gets_literal_fallback() {
        let cfg = MessagesConfig {
            disconnect: DisconnectMessages {
                no_route: String::new(),
                ..DisconnectMessages::default()
            },
            disconnect_locales: HashMap::new(),
        };
        assert_eq!(disconnect_reason(&cfg, "s", "", None), "no route");
    }

    #[test]
    fn builtin_locales_cover_expected_languages() {
        let locales = builtin_locales();
        for lang in ["de", "fr", "es", "pt", "pt-BR", "it"] {
            assert!(locales.contains_key(lang), "missing locale {lang}");
        }
    }
}
