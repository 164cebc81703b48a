//! Intent recognition.
//!
//! Normalized text is matched against an ordered pattern table. Groups are
//! checked in a fixed priority order and the first pattern whose entities
//! extract cleanly wins:
//!
//! help, switch-generation, garbage-collect, list-generations,
//! list-installed, list-services, service logs/status/enable/disable/
//! restart/start/stop, rebuild, remove, install, update (package before
//! system-wide), search, rollback, configure, explain.
//!
//! Confidence is fixed per pattern: specific phrasings >= 0.9, polite forms
//! 0.8-0.9, catch-alls 0.7-0.8. Nothing matching yields `Unknown` at 0.0.
//! Recognition never fails.

use crate::aliases::AliasResolver;
use crate::intent::{entity, Intent, IntentKind};
use regex::{Captures, Regex};

/// Optional leading politeness ("please", "could you", "i want to", ...)
const POLITE: &str =
    r"(?:(?:please|kindly|can you|could you|would you|help me|i want to|i need to|i'?d like to|i would like to)\s+)*";

/// Trailing option tokens such as `--impure`
const FLAGS: &str = r"(?P<flags>(?:\s+--?[a-z0-9][a-z0-9=._/-]*)*)";

/// "... and reinstall the bootloader"
const BOOT: &str =
    r"(?P<boot>\s+(?:and |with |then )?(?:reinstall(?:ing)?|install(?:ing)?|force(?: reinstall)?) (?:the )?boot ?loader)?";

/// systemd unit name
const SVC: &str = r"(?P<svc>[a-z0-9][a-z0-9@._-]*)";

/// (kind, confidence, pattern). Order is the match priority.
const PATTERNS: &[(IntentKind, f32, &str)] = &[
    // Help
    (IntentKind::Help, 0.95, r"^(?:help|\?|usage|commands|show help|what can you do|how do i use (?:this|you|nixie))$"),
    (IntentKind::Help, 0.8, r"^(?:help me|i need help|i'?m lost|what now)$"),
    // Switch generation
    (IntentKind::SwitchGeneration, 0.95, r"^{P}(?:switch|go|change|roll ?back)(?: back)? to generation (?:number )?(?P<gen>\d+)$"),
    (IntentKind::SwitchGeneration, 0.9, r"^{P}(?:activate|use|boot into) generation (?:number )?(?P<gen>\d+)$"),
    // Garbage collection
    (IntentKind::GarbageCollect, 0.95, r"^{P}(?:collect garbage|garbage collect(?:ion)?|run (?:the )?garbage collect(?:or|ion)|gc|nix-collect-garbage)$"),
    (IntentKind::GarbageCollect, 0.8, r"^{P}(?:clean ?up(?: (?:the |my )?(?:nix )?store| disk space| old generations)?|free (?:up )?(?:some )?(?:disk )?space|delete old generations)$"),
    // Generations
    (IntentKind::ListGenerations, 0.95, r"^{P}(?:list|show|display)(?: me)?(?: (?:my|the|all|system))* generations$"),
    (IntentKind::ListGenerations, 0.85, r"^(?:generations|(?:what|which) generations (?:do i have|are there|exist))$"),
    // Installed packages
    (IntentKind::ListInstalled, 0.9, r"^{P}(?:list|show)(?: me)?(?: (?:my|all|the))* installed(?: packages| programs| software)?$"),
    (IntentKind::ListInstalled, 0.85, r"^what(?:'s| is| do i have) installed$"),
    (IntentKind::ListInstalled, 0.85, r"^what (?:packages|programs|software) (?:are|do i have) installed$"),
    // Services
    (IntentKind::ListServices, 0.9, r"^{P}(?:list|show)(?: me)?(?: (?:all|the|running|my))* services$"),
    (IntentKind::ListServices, 0.85, r"^what services are (?:running|active)$"),
    (IntentKind::ServiceLogs, 0.9, r"^{P}(?:show|view|display|get|check)(?: me)?(?: the)? logs? (?:for|of) (?:the )?{SVC}(?: service)?$"),
    (IntentKind::ServiceLogs, 0.85, r"^{P}(?:the )?{SVC}(?: service)? logs$"),
    (IntentKind::ServiceStatus, 0.9, r"^{P}(?:systemctl )?status (?:of )?(?:the )?{SVC}(?: service)?$"),
    (IntentKind::ServiceStatus, 0.85, r"^{P}is (?:the )?{SVC}(?: service)? (?:running|up|active)$"),
    (IntentKind::ServiceStatus, 0.85, r"^{P}check(?: on)?(?: the)? {SVC} service$"),
    (IntentKind::ServiceEnable, 0.9, r"^{P}enable (?:the )?{SVC}(?: service)?(?: (?:at|on) boot)?$"),
    (IntentKind::ServiceDisable, 0.9, r"^{P}disable (?:the )?{SVC}(?: service)?(?: (?:at|on) boot)?$"),
    (IntentKind::ServiceRestart, 0.9, r"^{P}restart (?:the )?{SVC}(?: service)?$"),
    (IntentKind::ServiceStart, 0.9, r"^{P}start (?:the )?{SVC}(?: service)?$"),
    (IntentKind::ServiceStart, 0.8, r"^{P}(?:turn|switch) on (?:the )?{SVC} service$"),
    (IntentKind::ServiceStop, 0.9, r"^{P}stop (?:the )?{SVC}(?: service)?$"),
    (IntentKind::ServiceStop, 0.8, r"^{P}(?:turn|switch) off (?:the )?{SVC} service$"),
    // Rebuild
    (IntentKind::Rebuild, 0.95, r"^{P}(?:rebuild|nixos-rebuild)(?: (?:the |my )?(?:system|nixos|config(?:uration)?))?(?: (?P<rtype>switch|boot|test))?{BOOT}{FLAGS}$"),
    (IntentKind::Rebuild, 0.85, r"^{P}(?:apply|activate) (?:my |the )?(?:new )?(?:config(?:uration)?|changes)(?: changes)?{BOOT}{FLAGS}$"),
    (IntentKind::Rebuild, 0.85, r"^{P}(?P<rtype>test|boot) (?:my |the )?(?:new )?config(?:uration)?{FLAGS}$"),
    // Remove
    (IntentKind::Remove, 0.95, r"^{P}(?:remove|uninstall|delete|erase|get rid of) (?P<pkg>.+)$"),
    (IntentKind::Remove, 0.85, r"^i (?:don'?t|do not) (?:want|need) (?P<pkg>.+?)(?: anymore)?$"),
    // Install
    (IntentKind::Install, 0.95, r"^{P}(?:install|add) (?P<pkg>.+)$"),
    (IntentKind::Install, 0.85, r"^(?:i need|i want|i'?d like|i would like|could i (?:get|have)|can i (?:get|have)|may i have|get me|give me) (?P<pkg>.+)$"),
    // Update, package first
    (IntentKind::Update, 0.9, r"^{P}(?:update|upgrade) (?P<pkg>[^-].*)$"),
    (IntentKind::Update, 0.95, r"^{P}(?:update|upgrade)(?: (?:the |my )?(?:system|everything|all|nixos|os|computer|machine|all packages|packages|channels?))?{FLAGS}$"),
    (IntentKind::Update, 0.85, r"^{P}(?:get|apply|fetch|install) (?:the )?(?:latest )?(?:updates|upgrades)$"),
    (IntentKind::Update, 0.8, r"^{P}make (?:my |the )?system up to date$"),
    // Search
    (IntentKind::Search, 0.95, r"^{P}(?:search|find|look)(?: for| up)? (?P<query>.+)$"),
    (IntentKind::Search, 0.85, r"^(?:is there|do you have|are there)(?: a| an| any)? (?P<query>.+?)(?: packages?| available| in nixpkgs)*$"),
    (IntentKind::Search, 0.8, r"^what packages? (?:are there |is there )?for (?P<query>.+)$"),
    // Rollback
    (IntentKind::Rollback, 0.95, r"^{P}(?:roll ?back|undo)(?: (?:the |my )?(?:system|nixos|last (?:update|upgrade|change|rebuild)|changes?|update|upgrade))?(?: to (?:the )?previous (?:generation|version))?{BOOT}{FLAGS}$"),
    (IntentKind::Rollback, 0.85, r"^{P}(?:go back|revert)(?: to)?(?: the)? (?:previous|last) (?:generation|version|configuration|state){BOOT}{FLAGS}$"),
    // Configure
    (IntentKind::Configure, 0.9, r"^how (?:do|can|should) i (?:configure|set up|setup|enable) (?P<topic>.+)$"),
    (IntentKind::Configure, 0.85, r"^{P}(?:configure|set up|setup) (?P<topic>.+)$"),
    // Explain
    (IntentKind::Explain, 0.9, r"^(?:explain|tell me about|describe) (?P<topic>.+)$"),
    (IntentKind::Explain, 0.8, r"^(?:what is|what's|whats|what are|how does|how do) (?P<topic>.+?)(?: work)?$"),
];

/// Words that turn an install-shaped phrase into some other request.
const ACTION_WORDS: &[&str] = &[
    "search", "find", "look", "update", "updates", "upgrade", "upgrades", "remove",
    "uninstall", "rebuild", "rollback", "roll", "undo", "know", "learn", "configure",
    "understand", "help", "switch", "restart", "start", "stop", "enable", "disable",
    "list", "see", "check", "show",
];

/// Objects that mean "the whole system" rather than a package or unit.
const SYSTEM_WORDS: &[&str] = &[
    "system", "everything", "all", "nixos", "os", "computer", "machine", "pc",
    "packages", "channel", "channels", "service", "services",
];

struct Pattern {
    kind: IntentKind,
    confidence: f32,
    regex: Regex,
}

/// Maps free text to a typed `Intent`.
pub struct IntentRecognizer {
    patterns: Vec<Pattern>,
    aliases: AliasResolver,
}

impl Default for IntentRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentRecognizer {
    pub fn new() -> Self {
        Self::with_aliases(AliasResolver::new())
    }

    pub fn with_aliases(aliases: AliasResolver) -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|(kind, confidence, template)| {
                let source = expand(template);
                match Regex::new(&source) {
                    Ok(regex) => Some(Pattern {
                        kind: *kind,
                        confidence: *confidence,
                        regex,
                    }),
                    Err(e) => {
                        tracing::error!(kind = %kind, error = %e, "intent pattern failed to compile");
                        None
                    }
                }
            })
            .collect();
        Self { patterns, aliases }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Recognize `text`. Always returns an intent, `Unknown` when nothing fits.
    pub fn recognize(&self, text: &str) -> Intent {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Intent::unknown(text);
        }

        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(&normalized) else {
                continue;
            };
            let base = Intent::new(pattern.kind, pattern.confidence, text);
            if let Some(intent) = self.extract(base, &caps) {
                tracing::debug!(
                    kind = %intent.kind,
                    confidence = intent.confidence,
                    entities = ?intent.entities,
                    "intent recognized"
                );
                return intent;
            }
        }

        tracing::debug!(text = %normalized, "no intent pattern matched");
        Intent::unknown(text)
    }

    /// Fill entities for the matched kind. None means the pattern did not
    /// really match and the next one should be tried.
    fn extract(&self, intent: Intent, caps: &Captures) -> Option<Intent> {
        let intent = match intent.kind {
            IntentKind::Install | IntentKind::Remove => {
                let phrase = group(caps, "pkg")?;
                let words = self.aliases.content_words(phrase);
                let first = words.first()?;
                if intent.kind == IntentKind::Install && ACTION_WORDS.contains(&first.as_str()) {
                    return None;
                }
                let package = self.aliases.resolve(phrase)?;
                intent.with_entity(entity::PACKAGE, package)
            }
            IntentKind::Update => match group(caps, "pkg") {
                Some(phrase) => {
                    let words = self.aliases.content_words(phrase);
                    if words.is_empty() || words.iter().all(|w| is_system_word(w)) {
                        return None;
                    }
                    let package = self.aliases.resolve(phrase)?;
                    intent.with_entity(entity::PACKAGE, package)
                }
                None => intent,
            },
            IntentKind::Search => {
                let words: Vec<String> = self
                    .aliases
                    .content_words(group(caps, "query")?)
                    .into_iter()
                    .filter(|w| !matches!(w.as_str(), "packages" | "available" | "up"))
                    .collect();
                if words.is_empty() {
                    return None;
                }
                intent.with_entity(entity::QUERY, words.join(" "))
            }
            IntentKind::Configure | IntentKind::Explain => {
                let topic = strip_article(group(caps, "topic")?);
                if topic.is_empty() {
                    return None;
                }
                intent.with_entity(entity::TOPIC, topic)
            }
            IntentKind::SwitchGeneration => {
                let generation: u32 = group(caps, "gen")?.parse().ok()?;
                intent.with_entity(entity::GENERATION, generation.to_string())
            }
            IntentKind::ServiceStart
            | IntentKind::ServiceStop
            | IntentKind::ServiceRestart
            | IntentKind::ServiceStatus
            | IntentKind::ServiceEnable
            | IntentKind::ServiceDisable
            | IntentKind::ServiceLogs => {
                let service = group(caps, "svc")?;
                if is_system_word(service) || matches!(service, "the" | "a" | "my") {
                    return None;
                }
                intent.with_entity(entity::SERVICE, service)
            }
            IntentKind::Rebuild => {
                let rebuild_type = group(caps, "rtype").unwrap_or("switch");
                intent.with_entity(entity::REBUILD_TYPE, rebuild_type)
            }
            _ => intent,
        };

        Some(with_flags(intent, caps))
    }
}

/// Lowercase, trim, collapse whitespace, strip trailing punctuation.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim_end()
        .to_string()
}

fn expand(template: &str) -> String {
    template
        .replace("{P}", POLITE)
        .replace("{FLAGS}", FLAGS)
        .replace("{BOOT}", BOOT)
        .replace("{SVC}", SVC)
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn is_system_word(word: &str) -> bool {
    SYSTEM_WORDS.contains(&word)
}

fn strip_article(topic: &str) -> &str {
    ["a ", "an ", "the "]
        .iter()
        .find_map(|article| topic.strip_prefix(article))
        .unwrap_or(topic)
        .trim()
}

/// Record explicit option tokens and the bootloader phrase.
fn with_flags(intent: Intent, caps: &Captures) -> Intent {
    let mut flags: Vec<&str> = group(caps, "flags")
        .map(|f| f.split_whitespace().collect())
        .unwrap_or_default();
    if caps.name("boot").is_some() && !flags.contains(&"--install-bootloader") {
        flags.push("--install-bootloader");
    }
    if flags.is_empty() {
        intent
    } else {
        let joined = flags.join(" ");
        intent.with_entity(entity::FLAGS, joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::ALIAS_TABLE;

    fn recognize(text: &str) -> Intent {
        IntentRecognizer::new().recognize(text)
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(IntentRecognizer::new().pattern_count(), PATTERNS.len());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Install   Firefox!! "), "install firefox");
        assert_eq!(normalize("search python?."), "search python");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("ÉTEINDRE"), "éteindre");
    }

    #[test]
    fn test_install_phrasings() {
        for text in ["install firefox", "add firefox", "I need firefox", "could I get firefox", "please install firefox"] {
            let intent = recognize(text);
            assert_eq!(intent.kind, IntentKind::Install, "{}", text);
            assert!(intent.confidence >= 0.8, "{}", text);
            assert_eq!(intent.entity(entity::PACKAGE), Some("firefox"), "{}", text);
        }
        assert!(recognize("install firefox").confidence >= 0.9);
    }

    #[test]
    fn test_aliases_resolve_in_install() {
        for (alias, target) in ALIAS_TABLE {
            let intent = recognize(&format!("install {}", alias));
            assert_eq!(intent.kind, IntentKind::Install, "{}", alias);
            assert_eq!(intent.entity(entity::PACKAGE), Some(*target), "{}", alias);
        }
    }

    #[test]
    fn test_remove() {
        let intent = recognize("uninstall chrome");
        assert_eq!(intent.kind, IntentKind::Remove);
        assert_eq!(intent.entity(entity::PACKAGE), Some("google-chrome"));
        let intent = recognize("I don't need vim anymore");
        assert_eq!(intent.kind, IntentKind::Remove);
        assert_eq!(intent.entity(entity::PACKAGE), Some("vim"));
    }

    #[test]
    fn test_search() {
        let intent = recognize("search python");
        assert_eq!(intent.kind, IntentKind::Search);
        assert_eq!(intent.entity(entity::QUERY), Some("python"));
        let intent = recognize("is there a markdown editor available?");
        assert_eq!(intent.kind, IntentKind::Search);
        assert_eq!(intent.entity(entity::QUERY), Some("markdown editor"));
        assert_eq!(recognize("I want to search for python").kind, IntentKind::Search);
    }

    #[test]
    fn test_update_system_vs_package() {
        let system = recognize("update my system");
        assert_eq!(system.kind, IntentKind::Update);
        assert_eq!(system.entity(entity::PACKAGE), None);
        assert_eq!(recognize("update").kind, IntentKind::Update);
        assert_eq!(recognize("install the latest updates").kind, IntentKind::Update);

        let pkg = recognize("upgrade firefox");
        assert_eq!(pkg.kind, IntentKind::Update);
        assert_eq!(pkg.entity(entity::PACKAGE), Some("firefox"));
    }

    #[test]
    fn test_rollback_and_flags() {
        let intent = recognize("rollback system");
        assert_eq!(intent.kind, IntentKind::Rollback);
        assert!(intent.flags().is_empty());

        let intent = recognize("rollback system --install-bootloader");
        assert_eq!(intent.kind, IntentKind::Rollback);
        assert_eq!(intent.flags(), vec!["--install-bootloader"]);

        let intent = recognize("roll back and reinstall the bootloader");
        assert_eq!(intent.kind, IntentKind::Rollback);
        assert_eq!(intent.flags(), vec!["--install-bootloader"]);
    }

    #[test]
    fn test_rebuild_types() {
        let intent = recognize("rebuild the system");
        assert_eq!(intent.kind, IntentKind::Rebuild);
        assert_eq!(intent.entity(entity::REBUILD_TYPE), Some("switch"));
        let intent = recognize("test my new configuration");
        assert_eq!(intent.entity(entity::REBUILD_TYPE), Some("test"));
        let intent = recognize("nixos-rebuild boot --impure");
        assert_eq!(intent.entity(entity::REBUILD_TYPE), Some("boot"));
        assert_eq!(intent.flags(), vec!["--impure"]);
    }

    #[test]
    fn test_generations() {
        assert_eq!(recognize("list generations").kind, IntentKind::ListGenerations);
        assert_eq!(recognize("show me my system generations").kind, IntentKind::ListGenerations);
        let intent = recognize("switch to generation 42");
        assert_eq!(intent.kind, IntentKind::SwitchGeneration);
        assert_eq!(intent.entity(entity::GENERATION), Some("42"));
        // previous generation is a rollback, not a numbered switch
        assert_eq!(recognize("go back to the previous generation").kind, IntentKind::Rollback);
    }

    #[test]
    fn test_services() {
        let intent = recognize("restart nginx");
        assert_eq!(intent.kind, IntentKind::ServiceRestart);
        assert_eq!(intent.entity(entity::SERVICE), Some("nginx"));
        assert_eq!(recognize("is the sshd service running?").kind, IntentKind::ServiceStatus);
        assert_eq!(recognize("show logs for nginx").kind, IntentKind::ServiceLogs);
        assert_eq!(recognize("list services").kind, IntentKind::ListServices);
        assert_eq!(recognize("enable docker").kind, IntentKind::ServiceEnable);
        assert_eq!(recognize("restart the computer").kind, IntentKind::Unknown);
    }

    #[test]
    fn test_informational() {
        assert_eq!(recognize("help").kind, IntentKind::Help);
        let intent = recognize("what is a generation?");
        assert_eq!(intent.kind, IntentKind::Explain);
        assert_eq!(intent.entity(entity::TOPIC), Some("generation"));
        let intent = recognize("how do I configure networking");
        assert_eq!(intent.kind, IntentKind::Configure);
        assert_eq!(intent.entity(entity::TOPIC), Some("networking"));
        assert_eq!(recognize("what is installed").kind, IntentKind::ListInstalled);
    }

    #[test]
    fn test_garbage_collect() {
        assert_eq!(recognize("collect garbage").kind, IntentKind::GarbageCollect);
        let intent = recognize("free up some disk space");
        assert_eq!(intent.kind, IntentKind::GarbageCollect);
        assert!(intent.confidence < 0.9);
    }

    #[test]
    fn test_unknown_and_empty() {
        let empty = recognize("");
        assert_eq!(empty.kind, IntentKind::Unknown);
        assert_eq!(empty.confidence, 0.0);
        assert_eq!(recognize("   ").kind, IntentKind::Unknown);
        assert_eq!(recognize("the weather is nice").kind, IntentKind::Unknown);
        assert_eq!(recognize("install").kind, IntentKind::Unknown);
    }

    #[test]
    fn test_raw_text_preserved() {
        let intent = recognize("  Install Firefox  ");
        assert_eq!(intent.raw_text, "  Install Firefox  ");
    }

    #[test]
    fn test_unicode_input() {
        let intent = recognize("INSTALL Café");
        assert_eq!(intent.kind, IntentKind::Install);
        assert_eq!(intent.entity(entity::PACKAGE), Some("café"));
    }
}
