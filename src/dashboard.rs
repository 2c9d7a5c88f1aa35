/// dashboard.rs – ratatui live terminal dashboard.
///
/// Layout (4 panels):
///  ┌─ Header ──────────────────────────────────────────────────────────┐
///  │ Challenge Tracker │ accounts │ daily P&L │ payouts │ masters flag │
///  ├─ Challenges ──────────────────────────────────────────────────────┤
///  │ table: alias firm phase progress drawdown status streak daily     │
///  ├─ Notifications ───────────────┬─ Logs ────────────────────────────┤
///  │ newest trade events           │ timestamped log lines             │
///  └───────────────────────────────┴───────────────────────────────────┘
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io::{self, Stdout};

use crate::models::{AppState, ChallengeStatus, ConnectionState};

pub type CrossTerm = Terminal<CrosstermBackend<Stdout>>;

// ---------------------------------------------------------------------------
// Setup / teardown
// ---------------------------------------------------------------------------

pub fn setup_terminal() -> anyhow::Result<CrossTerm> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

pub fn teardown_terminal(terminal: &mut CrossTerm) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Key event handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    None,
    Quit,
    ToggleMasters,
}

/// Map a terminal event to a UI action: q/Ctrl-C quits, m toggles
/// master-account inclusion in the notification poll.
pub fn handle_event(event: &Event) -> UiAction {
    let Event::Key(k) = event else {
        return UiAction::None;
    };
    match k.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => UiAction::Quit,
        KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => UiAction::Quit,
        KeyCode::Char('m') | KeyCode::Char('M') => UiAction::ToggleMasters,
        _ => UiAction::None,
    }
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

pub fn render(frame: &mut Frame, state: &AppState) {
    let area = frame.size();

    // Outer layout: header | challenges | bottom row
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(12),
        ])
        .split(area);

    render_header(frame, outer[0], state);
    render_challenges(frame, outer[1], state);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(outer[2]);

    render_notifications(frame, bottom[0], state);
    render_logs(frame, bottom[1], state);
}

fn render_header(frame: &mut Frame, area: ratatui::layout::Rect, state: &AppState) {
    let connected = state.accounts.values().filter(|a| a.connected).count();
    let daily: f64 = state.rows.iter().map(|r| r.daily_pnl).sum();
    let unread = state.unread_count(chrono::Utc::now());

    let masters = if state.include_masters {
        Span::styled("[masters ON]", Style::default().fg(Color::Yellow))
    } else {
        Span::styled("[masters off]", Style::default().fg(Color::DarkGray))
    };
    let api = if state.api_ok {
        Span::styled("API ✓", Style::default().fg(Color::Green))
    } else {
        Span::styled("API ✗", Style::default().fg(Color::Red))
    };

    let line = Line::from(vec![
        Span::styled(
            " Challenge Tracker ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "│ {connected}/{} connected ",
            state.accounts.len()
        )),
        Span::styled(
            format!("│ today {daily:+.2} "),
            Style::default().fg(if daily >= 0.0 { Color::Green } else { Color::Red }),
        ),
        Span::raw(format!(
            "│ payouts {:.0} recv / {:.0} pend ",
            state.payouts_received, state.payouts_pending
        )),
        Span::raw(format!("│ 🔔 {unread} ")),
        masters,
        Span::raw(" "),
        api,
        Span::styled(
            "  (q quit, m masters)",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(p, area);
}

fn render_challenges(frame: &mut Frame, area: ratatui::layout::Rect, state: &AppState) {
    let header = Row::new(vec![
        "Alias", "Firm", "Phase", "Plat", "Balance", "Equity", "Prog%", "DD%", "Limit",
        "Status", "Streak", "Today", "State",
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = state.rows.iter().map(|r| {
        let status_style = match r.status {
            ChallengeStatus::Active => Style::default().fg(Color::Cyan),
            ChallengeStatus::Passed => Style::default().fg(Color::Green),
            ChallengeStatus::Failed => Style::default().fg(Color::Red),
        };
        let state_style = match r.state {
            ConnectionState::Connected => Style::default().fg(Color::Green),
            ConnectionState::Disconnected => Style::default().fg(Color::DarkGray),
        };
        let streak = r
            .streak
            .map(|s| format!("{}{}", s.direction.as_str(), s.count))
            .unwrap_or_else(|| "–".into());
        let alias = if r.is_master {
            format!("★ {}", r.alias)
        } else {
            r.alias.clone()
        };

        Row::new(vec![
            Cell::from(alias),
            Cell::from(r.prop_firm.clone()),
            Cell::from(r.phase.clone()),
            Cell::from(r.platform.as_str()),
            Cell::from(format!("{:.2}", r.balance)),
            Cell::from(format!("{:.2}", r.equity)),
            Cell::from(format!("{:.1}", r.progress_pct)),
            Cell::from(format!("{:.2}", r.current_dd_pct)),
            Cell::from(format!("{:.0}", r.max_dd_pct)),
            Cell::from(r.status.as_str()).style(status_style),
            Cell::from(streak),
            Cell::from(format!("{:+.2}", r.daily_pnl)),
            Cell::from(r.state.as_str()).style(state_style),
        ])
    });

    let widths = [
        Constraint::Length(16),
        Constraint::Length(14),
        Constraint::Length(8),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(9),
        Constraint::Length(12),
    ];

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Challenges ({}) ", state.rows.len())),
    );
    frame.render_widget(table, area);
}

fn render_notifications(frame: &mut Frame, area: ratatui::layout::Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .notifications
        .iter()
        .take(area.height.saturating_sub(2) as usize)
        .map(|n| {
            let (label, style) = if n.is_open {
                ("OPEN ", Style::default().fg(Color::Cyan))
            } else if n.profit > 0.0 {
                ("TP   ", Style::default().fg(Color::Green))
            } else if n.profit < 0.0 {
                ("SL   ", Style::default().fg(Color::Red))
            } else {
                ("CLOSE", Style::default().fg(Color::Gray))
            };
            let text = format!(
                "{} {} {} {} {:.2} {:+.2}",
                n.timestamp.format("%H:%M"),
                label,
                n.account_alias,
                n.symbol,
                n.volume,
                n.profit,
            );
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Notifications "),
    );
    frame.render_widget(list, area);
}

fn render_logs(frame: &mut Frame, area: ratatui::layout::Rect, state: &AppState) {
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .take(area.height.saturating_sub(2) as usize)
        .map(|l| ListItem::new(l.as_str()))
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Log "));
    frame.render_widget(list, area);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyEventKind, KeyEventState};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn quit_keys() {
        assert_eq!(
            handle_event(&key(KeyCode::Char('q'), KeyModifiers::NONE)),
            UiAction::Quit
        );
        assert_eq!(
            handle_event(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            UiAction::Quit
        );
    }

    #[test]
    fn toggle_key() {
        assert_eq!(
            handle_event(&key(KeyCode::Char('m'), KeyModifiers::NONE)),
            UiAction::ToggleMasters
        );
    }

    #[test]
    fn other_keys_are_ignored() {
        assert_eq!(
            handle_event(&key(KeyCode::Char('c'), KeyModifiers::NONE)),
            UiAction::None
        );
        assert_eq!(
            handle_event(&key(KeyCode::Enter, KeyModifiers::NONE)),
            UiAction::None
        );
    }
}
