//! Console alert output with terminal-injection protection.
//!
//! Alert fields carry attacker-controlled log content; [`sanitize`] strips
//! control characters (everything below 0x20 except `\n` and `\t`) before
//! anything reaches the terminal, defeating escape-sequence injection.

use crate::alerts::Alert;

/// Strip control characters except newline and tab.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|&c| c >= ' ' || c == '\n' || c == '\t')
        .collect()
}

/// Print one alert block to stdout.
pub fn print_alert(alert: &Alert) {
    let action = alert
        .suggested_action
        .as_ref()
        .map(|a| format!("{} {} ({})", a.kind, a.target, a.duration))
        .unwrap_or_else(|| "none".to_string());

    println!();
    println!("[ALERT] Risk: {} | {}", alert.risk, sanitize(&alert.summary));
    println!("Explain: {}", sanitize(&alert.explanation));
    println!("Action: {}", sanitize(&action));
}
