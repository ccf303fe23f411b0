//! Textual clean-up of a raw report.
//!
//! `lspci` is not consistent about how it separates a label from its value, and a few
//! fields pack sub-lists in ad-hoc punctuation. The rewrites below bring those into the
//! two shapes the lexer understands (`label: value` and `label:\tvalue`) and the
//! comma-separated lists the field parsers expect.
//!
//! The rules run in a fixed order and later rules rely on earlier ones. A rule can
//! produce text that an earlier rule matches (`; ` becoming `, ` after `bit`), so the
//! ordered pass repeats until the text stops changing.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `PME(D0+,D1-,D2-,D3hot+,D3cold+)` inside power management flags.
static PME_STATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mR) *PME\(([^)]+)\) *($|\S)").expect("valid PME pattern")
});

enum Rule {
    Literal(&'static str, &'static str),
    PmeStates,
}

const RULES: &[Rule] = &[
    // Fields whose continuation lines must be merged using the colon-tab convention.
    Rule::Literal("Capabilities: ", "Capabilities:\t"),
    Rule::Literal("BridgeCtl: ", "BridgeCtl:\t"),
    Rule::Literal("Read-only fields:", "Read only fields:\t"),
    Rule::Literal("Read/write fields:", "Read write fields:\t"),
    Rule::Literal("Expansion ROM at ", "Expansion ROM: "),
    // `(32-bit, non-prefetchable)`
    Rule::Literal("bit, ", "bit "),
    Rule::Literal("LN System CLS", "LN-System-CLS"),
    // `ASPM Disabled; RCB 64 bytes`
    Rule::Literal("; ", ", "),
    // `Exit Latency L0s <1us, L1 <4us`
    Rule::Literal(", L1", " L1"),
    Rule::PmeStates,
    // `Compliance Preset/De-emphasis: -6dB de-emphasis, 0dB preshoot`
    Rule::Literal("dB de-emphasis, ", "dB de-emphasis "),
    Rule::Literal(" CrosslinkRes: unsupported", " CrosslinkRes=unsupported"),
    Rule::Literal(" Interrupt Message Number: ", " Interrupt-Message-Number="),
];

/// Rewrite the known irregularities of a report into canonical shapes.
pub fn normalize(source: &str) -> String {
    let mut normalized = source.to_string();
    let mut passes = 0;

    loop {
        passes += 1;
        let next = apply_rules(&normalized);
        if next == normalized {
            break;
        }
        normalized = next;
    }

    tracing::trace!(
        input = source.len(),
        output = normalized.len(),
        passes,
        "normalized report"
    );

    normalized
}

fn apply_rules(text: &str) -> String {
    RULES.iter().fold(text.to_string(), |text, rule| match rule {
        Rule::Literal(from, to) => text.replace(from, to),
        Rule::PmeStates => PME_STATES.replace_all(&text, pme_states).into_owned(),
    })
}

/// `... AuxCurrent=0mA PME(D0+,D1-)` becomes `... AuxCurrent=0mA, PME: D0+ D1-`.
fn pme_states(caps: &Captures) -> String {
    let states = caps[1].replace(',', " ");
    match &caps[2] {
        "" => format!(", PME: {states}"),
        next => format!(", PME: {states}, {next}"),
    }
}
