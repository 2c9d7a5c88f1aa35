/// rules.rs – Static prop-firm rule tables and server-name mapping.
///
/// Read-only at runtime. Lookups never fail: an unknown firm or phase falls
/// back to `DEFAULT_RULE`, an unmatched server name to "Unknown".
use crate::models::PhaseRule;

/// Fallback when the firm/phase combination is not in the table.
pub const DEFAULT_RULE: PhaseRule = PhaseRule {
    target_pct: 0.0,
    daily_dd_pct: 5.0,
    max_dd_pct: 10.0,
};

const fn rule(target_pct: f64, daily_dd_pct: f64, max_dd_pct: f64) -> PhaseRule {
    PhaseRule {
        target_pct,
        daily_dd_pct,
        max_dd_pct,
    }
}

// ---------------------------------------------------------------------------
// Per-firm phase rules
// ---------------------------------------------------------------------------

#[rustfmt::skip]
static PROP_FIRM_RULES: &[(&str, &[(&str, PhaseRule)])] = &[
    ("FTMO", &[
        ("Phase 1", rule(10.0, 5.0, 10.0)),
        ("Phase 2", rule(5.0, 5.0, 10.0)),
        ("Funded",  rule(0.0, 5.0, 10.0)),
    ]),
    ("The 5%ers", &[
        ("Phase 1", rule(8.0, 5.0, 10.0)),
        ("Phase 2", rule(5.0, 5.0, 10.0)),
        ("Funded",  rule(0.0, 5.0, 10.0)),
    ]),
    ("FundedHive", &[
        ("Phase 1", rule(8.0, 5.0, 8.0)),
        ("Phase 2", rule(5.0, 5.0, 8.0)),
        ("Funded",  rule(0.0, 5.0, 8.0)),
    ]),
    ("FundedNext", &[
        ("Phase 1", rule(10.0, 5.0, 10.0)),
        ("Phase 2", rule(5.0, 5.0, 10.0)),
        ("Funded",  rule(0.0, 5.0, 10.0)),
    ]),
    ("MyFundedFX", &[
        ("Phase 1", rule(8.0, 5.0, 12.0)),
        ("Phase 2", rule(5.0, 5.0, 12.0)),
        ("Funded",  rule(0.0, 5.0, 12.0)),
    ]),
    ("E8 Funding", &[
        ("Phase 1", rule(8.0, 5.0, 8.0)),
        ("Funded",  rule(0.0, 5.0, 8.0)),
    ]),
    ("Alpha Capital", &[
        ("Phase 1", rule(8.0, 5.0, 10.0)),
        ("Phase 2", rule(5.0, 5.0, 10.0)),
        ("Funded",  rule(0.0, 5.0, 10.0)),
    ]),
    ("SurgeTrader", &[
        ("Phase 1", rule(10.0, 5.0, 8.0)),
        ("Funded",  rule(0.0, 4.0, 5.0)),
    ]),
    ("TrueForexFunds", &[
        ("Phase 1", rule(8.0, 5.0, 10.0)),
        ("Phase 2", rule(5.0, 5.0, 10.0)),
        ("Funded",  rule(0.0, 5.0, 10.0)),
    ]),
    ("City Traders Imperium", &[
        ("Phase 1", rule(10.0, 0.0, 10.0)),
        ("Phase 2", rule(5.0, 0.0, 10.0)),
        ("Funded",  rule(0.0, 0.0, 10.0)),
    ]),
];

/// Drawdown/target rules for a firm+phase. Unrecognized combinations get
/// `DEFAULT_RULE` (5 % daily, 10 % max).
pub fn phase_rules(prop_firm: &str, phase: &str) -> PhaseRule {
    PROP_FIRM_RULES
        .iter()
        .find(|(firm, _)| *firm == prop_firm)
        .and_then(|(_, phases)| phases.iter().find(|(name, _)| *name == phase))
        .map(|(_, rule)| *rule)
        .unwrap_or(DEFAULT_RULE)
}

// ---------------------------------------------------------------------------
// Server name → prop firm
// ---------------------------------------------------------------------------

static SERVER_MAPPINGS: &[(&str, &str)] = &[
    ("FTMO", "FTMO"),
    ("TheFive", "The 5%ers"),
    ("5ers", "The 5%ers"),
    ("FundedHive", "FundedHive"),
    ("FundedNext", "FundedNext"),
    ("MyFundedFX", "MyFundedFX"),
    ("TrueForex", "TrueForexFunds"),
    ("Topstep", "Topstep"),
    ("E8Fund", "E8 Funding"),
    ("E8Markets", "E8 Funding"),
    ("SurgeTrader", "SurgeTrader"),
    ("CityTraders", "City Traders Imperium"),
    ("Alpha", "Alpha Capital"),
];

/// Guess the prop firm from a broker server name by case-insensitive
/// substring match; "Unknown" when nothing matches.
pub fn guess_prop_firm(server: &str) -> &'static str {
    let s = server.to_lowercase();
    SERVER_MAPPINGS
        .iter()
        .find(|(pattern, _)| s.contains(&pattern.to_lowercase()))
        .map(|(_, firm)| *firm)
        .unwrap_or("Unknown")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_firm_and_phase() {
        let r = phase_rules("FTMO", "Phase 1");
        assert_eq!(r.target_pct, 10.0);
        assert_eq!(r.daily_dd_pct, 5.0);
        assert_eq!(r.max_dd_pct, 10.0);
    }

    #[test]
    fn funded_phase_has_no_target() {
        let r = phase_rules("The 5%ers", "Funded");
        assert_eq!(r.target_pct, 0.0);
    }

    #[test]
    fn unknown_firm_gets_default() {
        assert_eq!(phase_rules("NoSuchFirm", "Phase 1"), DEFAULT_RULE);
    }

    #[test]
    fn unknown_phase_gets_default() {
        assert_eq!(phase_rules("FTMO", "Phase 99"), DEFAULT_RULE);
    }

    #[test]
    fn server_mapping_is_case_insensitive() {
        assert_eq!(guess_prop_firm("ftmo-server2"), "FTMO");
        assert_eq!(guess_prop_firm("E8Markets-Live"), "E8 Funding");
        assert_eq!(guess_prop_firm("TheFive-Real"), "The 5%ers");
    }

    #[test]
    fn unmatched_server_is_unknown() {
        assert_eq!(guess_prop_firm("ICMarkets-Demo"), "Unknown");
    }
}
