//! Content guard: detection and neutralization of prompt injection and
//! exfiltration attempts in untrusted text.
//!
//! Scanning runs three passes:
//!
//! 1. **Injection** phrasing: instruction overrides, role overrides, jailbreaks.
//! 2. **Exfiltration** phrasing: instructions to ship captured data elsewhere.
//! 3. **Encoding**: base64-looking blocks whose decoded text contains
//!    injection phrasing.
//!
//! Matches are replaced with a typed placeholder, and the content is wrapped
//! with a source label and a threat-count banner before it may enter the
//! model's context.

use std::sync::LazyLock;

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine as _,
};
use regex::Regex;
use tracing::warn;
use warden_contracts::{
    action::Severity,
    threat::{ContentThreat, ThreatKind},
};

/// Matched text kept on a threat is cut to this many characters.
const MAX_MATCHED_TEXT: usize = 80;

struct ThreatPattern {
    name: &'static str,
    kind: ThreatKind,
    severity: Severity,
    pattern: Regex,
}

fn pattern(name: &'static str, kind: ThreatKind, severity: Severity, source: &str) -> ThreatPattern {
    ThreatPattern {
        name,
        kind,
        severity,
        pattern: Regex::new(source).expect("built-in threat pattern must compile"),
    }
}

static THREAT_PATTERNS: LazyLock<Vec<ThreatPattern>> = LazyLock::new(|| {
    use Severity::{High, Medium};
    use ThreatKind::{DataExfiltration, PromptInjection};
    vec![
        pattern(
            "ignore-instructions",
            PromptInjection,
            High,
            r"(?i)\b(ignore|disregard|forget|override)\s+(all\s+|any\s+|the\s+|your\s+)*(previous|prior|above|earlier|preceding|system)\s+(instructions?|prompts?|directions|rules|messages|context)",
        ),
        pattern(
            "forget-everything",
            PromptInjection,
            High,
            r"(?i)\bforget\s+(everything|all)\s+(you|that)\b",
        ),
        pattern(
            "role-override",
            PromptInjection,
            High,
            r"(?i)\byou\s+are\s+(now|no\s+longer)\s+(a|an|the|in|my)?\b",
        ),
        pattern(
            "new-instructions",
            PromptInjection,
            High,
            r"(?i)\b(new|updated|real|actual)\s+(system\s+)?instructions\s*:",
        ),
        pattern(
            "system-prompt-marker",
            PromptInjection,
            High,
            r"(?im)(<\|?(im_start|system|endoftext)\|?>|^\s*\[?system\]?\s*:)",
        ),
        pattern(
            "jailbreak",
            PromptInjection,
            High,
            r"(?i)\b(jailbreak|jailbroken|do\s+anything\s+now|DAN\s+mode|developer\s+mode\s+(enabled|on))\b",
        ),
        pattern(
            "pretend-unrestricted",
            PromptInjection,
            Medium,
            r"(?i)\b(act|pretend|behave)\s+(as|like)\s+(an?\s+)?(unrestricted|unfiltered|uncensored)\b",
        ),
        pattern(
            "send-data-to",
            DataExfiltration,
            High,
            r"(?i)\b(send|post|upload|transmit|exfiltrate|forward|leak|email)\b[^\n]{0,60}?\b(contents?|data|secrets?|keys?|credentials|tokens?|passwords?|env(ironment)?(\s+variables)?|files?|history|conversation)\b[^\n]{0,60}?\bto\s+(https?://|\S+@\S+|(the\s+)?(following\s+)?(url|endpoint|server|webhook|address))",
        ),
        pattern(
            "curl-data-upload",
            DataExfiltration,
            Medium,
            r"(?i)\bcurl\b[^\n]*\s(-d|--data(-binary|-raw)?|-F|--form|-T|--upload-file)\s[^\n]*https?://",
        ),
        pattern(
            "markdown-image-beacon",
            DataExfiltration,
            Medium,
            r"!\[[^\]]*\]\(https?://[^)\s]*\?[^)\s]*=[^)\s]*\)",
        ),
    ]
});

static BASE64_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{40,}={0,2}").expect("base64 pattern must compile"));

/// Untrusted text after the guard has processed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedContent {
    /// Text safe to place in the model's context.
    pub content: String,
    pub threats: Vec<ContentThreat>,
}

impl GuardedContent {
    pub fn is_clean(&self) -> bool {
        self.threats.is_empty()
    }
}

fn truncate_match(text: &str) -> String {
    if text.chars().count() <= MAX_MATCHED_TEXT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_MATCHED_TEXT).collect();
        format!("{cut}...")
    }
}

fn decode_base64(block: &str) -> Option<String> {
    let bytes = STANDARD
        .decode(block)
        .or_else(|_| STANDARD_NO_PAD.decode(block.trim_end_matches('=')))
        .ok()?;
    String::from_utf8(bytes).ok()
}

fn is_injection_phrase(text: &str) -> bool {
    THREAT_PATTERNS
        .iter()
        .filter(|p| p.kind == ThreatKind::PromptInjection)
        .any(|p| p.pattern.is_match(text))
}

/// Scan `text` and return every threat found, ordered by position.
pub fn scan(text: &str) -> Vec<ContentThreat> {
    let mut threats = Vec::new();

    for p in THREAT_PATTERNS.iter() {
        for m in p.pattern.find_iter(text) {
            threats.push(ContentThreat {
                kind: p.kind,
                severity: p.severity,
                pattern: p.name.to_string(),
                matched_text: truncate_match(m.as_str()),
                position: m.start(),
            });
        }
    }

    for m in BASE64_BLOCK.find_iter(text) {
        if let Some(decoded) = decode_base64(m.as_str()) {
            if is_injection_phrase(&decoded) {
                threats.push(ContentThreat {
                    kind: ThreatKind::SuspiciousEncoding,
                    severity: Severity::High,
                    pattern: "base64-injection".to_string(),
                    matched_text: truncate_match(m.as_str()),
                    position: m.start(),
                });
            }
        }
    }

    threats.sort_by_key(|t| t.position);
    threats
}

/// Byte spans to redact, merged where they overlap. Each span keeps the kind
/// of the earliest threat that opened it.
fn redaction_spans(text: &str) -> Vec<(usize, usize, ThreatKind)> {
    let mut raw: Vec<(usize, usize, ThreatKind)> = THREAT_PATTERNS
        .iter()
        .flat_map(|p| p.pattern.find_iter(text).map(move |m| (m.start(), m.end(), p.kind)))
        .collect();
    raw.extend(BASE64_BLOCK.find_iter(text).filter_map(|m| {
        decode_base64(m.as_str())
            .filter(|decoded| is_injection_phrase(decoded))
            .map(|_| (m.start(), m.end(), ThreatKind::SuspiciousEncoding))
    }));
    merge_spans(raw)
}

fn merge_spans(mut raw: Vec<(usize, usize, ThreatKind)>) -> Vec<(usize, usize, ThreatKind)> {
    raw.sort_by_key(|(start, _, _)| *start);

    let mut spans: Vec<(usize, usize, ThreatKind)> = Vec::new();
    for (start, end, kind) in raw {
        match spans.last_mut() {
            Some(last) if start < last.1 => last.1 = last.1.max(end),
            _ => spans.push((start, end, kind)),
        }
    }
    spans
}

/// Replace every threat span in `text` with `[REDACTED:<kind>]`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, kind) in redaction_spans(text) {
        out.push_str(&text[cursor..start]);
        out.push_str(&format!("[REDACTED:{kind}]"));
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Scan, sanitize, and label untrusted `text` originating from `source`.
///
/// Clean text is returned unchanged. Flagged text is redacted and wrapped in
/// a banner naming the source and the number of threats neutralized.
pub fn guard(text: &str, source: &str) -> GuardedContent {
    let threats = scan(text);
    if threats.is_empty() {
        return GuardedContent {
            content: text.to_string(),
            threats,
        };
    }

    warn!(
        source = %source,
        threat_count = threats.len(),
        kinds = %threats.iter().map(|t| t.kind.as_str()).collect::<Vec<_>>().join(","),
        "content guard neutralized untrusted text"
    );

    let content = format!(
        "[UNTRUSTED CONTENT from {source}: {} potential threat(s) neutralized]\n{}\n[END UNTRUSTED CONTENT]",
        threats.len(),
        sanitize(text)
    );
    GuardedContent { content, threats }
}
