use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{BarChart, Block, Borders, Gauge, Paragraph, Row, Table, Tabs};
use ratatui::Terminal;
use secdash_core::report::{EnrollmentReport, VpnReport, ZtnaReport};
use secdash_core::{Branding, Dashboard, DashboardSnapshot, HttpTransport};

const TABS: [&str; 4] = ["1 Overview", "2 Users", "3 VPN", "4 ZTNA"];
const TOP_RESOURCES: usize = 15;

struct ViewerState {
    latest: Option<DashboardSnapshot>,
    tab: usize,
    logo_status: String,
}

impl ViewerState {
    fn new(branding: &Branding) -> Self {
        let missing = branding.missing_logos().len();
        let logo_status = format!("logos {}/{}", branding.logo_paths.len() - missing, branding.logo_paths.len());
        Self {
            latest: None,
            tab: 0,
            logo_status,
        }
    }
}

pub async fn run_viewer<T: HttpTransport>(
    dashboard: &mut Dashboard<T>,
    branding: &Branding,
    refresh_every: Duration,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = ViewerState::new(branding);
    let mut next_refresh = Instant::now();
    let mut command_buffer = String::new();

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Char('r') => next_refresh = Instant::now(),
                        KeyCode::Char(c @ '1'..='4') => {
                            state.tab = c as usize - '1' as usize;
                        }
                        KeyCode::Tab | KeyCode::Right => state.tab = (state.tab + 1) % TABS.len(),
                        KeyCode::Left => state.tab = (state.tab + TABS.len() - 1) % TABS.len(),
                        KeyCode::Char(c) => {
                            command_buffer.push(c.to_ascii_lowercase());
                            if command_buffer.len() > 8 {
                                let drain = command_buffer.len() - 8;
                                command_buffer.drain(0..drain);
                            }
                            if command_buffer.ends_with("exit") {
                                break;
                            }
                        }
                        KeyCode::Backspace => {
                            command_buffer.pop();
                        }
                        _ => {}
                    }
                }
            }

            if Instant::now() >= next_refresh {
                terminal.draw(|frame| draw_ui(frame.size(), frame, &state, true))?;
                state.latest = Some(dashboard.refresh().await);
                next_refresh = Instant::now() + refresh_every;
            }

            terminal.draw(|frame| draw_ui(frame.size(), frame, &state, false))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn draw_ui(area: Rect, frame: &mut ratatui::Frame<'_>, state: &ViewerState, refreshing: bool) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    frame.render_widget(render_header(state, refreshing), rows[0]);

    let tabs = Tabs::new(TABS.to_vec())
        .block(Block::default().borders(Borders::ALL))
        .select(state.tab)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, rows[1]);

    let Some(snapshot) = &state.latest else {
        frame.render_widget(Paragraph::new(Line::from("Waiting first refresh...")), rows[2]);
        return;
    };

    match state.tab {
        0 => draw_overview(frame, rows[2], snapshot.enrollment.as_ref()),
        1 => draw_users(frame, rows[2], snapshot.enrollment.as_ref()),
        2 => draw_vpn(frame, rows[2], snapshot.vpn.as_ref()),
        _ => draw_ztna(frame, rows[2], snapshot.ztna.as_ref()),
    }
}

fn render_header(state: &ViewerState, refreshing: bool) -> Paragraph<'static> {
    let mut lines = Vec::new();
    let title = Span::styled(
        "Secure Access Dashboard  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    );
    match &state.latest {
        Some(snapshot) => {
            let status = format!(
                "updated={} refresh_ms={} {}  {}",
                snapshot.ts.format("%Y-%m-%d %H:%M:%S"),
                snapshot.refresh_ms,
                state.logo_status,
                if refreshing { "refreshing..." } else { "(press 'q' to quit, 'r' to refresh)" },
            );
            lines.push(Line::from(vec![title, Span::raw(status)]));
            if snapshot.failures.is_empty() {
                lines.push(Line::from("all sections up to date"));
            } else {
                lines.push(Line::from(Span::styled(
                    snapshot.failures.join("; "),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        None => {
            lines.push(Line::from(vec![title, Span::raw(state.logo_status.clone())]));
            lines.push(Line::from("Fetching first refresh..."));
        }
    }

    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"))
}

fn no_data(frame: &mut ratatui::Frame<'_>, area: Rect, title: &str) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled("no data", Style::default().fg(Color::DarkGray)))).block(block),
        area,
    );
}

fn draw_overview(frame: &mut ratatui::Frame<'_>, area: Rect, report: Option<&EnrollmentReport>) {
    let Some(report) = report else {
        return no_data(frame, area, "Enrollment");
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let counts = format!(
        "identities={} enrolled={} unenrolled={} active={} malformed={}",
        report.total_identities,
        report.enrolled.len(),
        report.unenrolled.len(),
        report.with_active_devices,
        report.malformed_labels.len(),
    );
    frame.render_widget(
        Paragraph::new(Line::from(counts)).block(Block::default().borders(Borders::ALL).title("Overview")),
        rows[0],
    );

    let ratio = (report.active_percentage / 100.0).clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Users with active devices"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(format!(
            "{:.1}% active / {:.1}% remaining",
            report.active_percentage, report.remaining_percentage
        ));
    frame.render_widget(gauge, rows[1]);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    let labels: Vec<(String, u64)> = report
        .device_distribution
        .iter()
        .map(|bucket| (bucket.active_devices.to_string(), bucket.users as u64))
        .collect();
    let bars: Vec<(&str, u64)> = labels.iter().map(|(label, users)| (label.as_str(), *users)).collect();
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title("Active devices per user"))
        .data(bars.as_slice())
        .bar_width(5)
        .bar_style(Style::default().fg(Color::Yellow));
    frame.render_widget(chart, cols[0]);

    let table = Table::new(
        report.multi_device.iter().map(|row| {
            Row::new(vec![
                row.usuario.clone(),
                row.correo.clone(),
                row.active_devices.to_string(),
            ])
        }),
        [Constraint::Percentage(40), Constraint::Percentage(45), Constraint::Percentage(15)],
    )
    .header(header_row(&["Usuario", "Correo", "Active"]))
    .block(Block::default().borders(Borders::ALL).title("Multi-device users"));
    frame.render_widget(table, cols[1]);
}

fn draw_users(frame: &mut ratatui::Frame<'_>, area: Rect, report: Option<&EnrollmentReport>) {
    let Some(report) = report else {
        return no_data(frame, area, "Users");
    };
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let enrolled = Table::new(
        report.enrolled.iter().map(|row| {
            Row::new(vec![
                row.usuario.clone(),
                row.correo.clone(),
                row.active_devices.to_string(),
                row.expired_devices.to_string(),
                row.revoked_devices.to_string(),
            ])
        }),
        [
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(10),
            Constraint::Percentage(10),
            Constraint::Percentage(10),
        ],
    )
    .header(header_row(&["Usuario", "Correo", "Active", "Expired", "Revoked"]))
    .block(Block::default().borders(Borders::ALL).title(format!("Enrolled ({})", report.enrolled.len())));
    frame.render_widget(enrolled, cols[0]);

    let unenrolled = Table::new(
        report
            .unenrolled
            .iter()
            .map(|user| Row::new(vec![user.usuario.clone(), user.correo.clone()])),
        [Constraint::Percentage(50), Constraint::Percentage(50)],
    )
    .header(header_row(&["Usuario", "Correo"]))
    .block(Block::default().borders(Borders::ALL).title(format!("Unenrolled ({})", report.unenrolled.len())));
    frame.render_widget(unenrolled, cols[1]);
}

fn draw_vpn(frame: &mut ratatui::Frame<'_>, area: Rect, report: Option<&VpnReport>) {
    let Some(report) = report else {
        return no_data(frame, area, "Machine tunnel VPN");
    };
    let table = Table::new(
        report.rows.iter().map(|row| {
            Row::new(vec![
                row.device_name.clone(),
                row.public_ip.clone(),
                row.assigned_ip.clone(),
                row.login_time.clone(),
                row.active_time.clone(),
                row.usuario.clone(),
            ])
        }),
        [
            Constraint::Percentage(22),
            Constraint::Percentage(14),
            Constraint::Percentage(14),
            Constraint::Percentage(18),
            Constraint::Percentage(10),
            Constraint::Percentage(22),
        ],
    )
    .header(header_row(&["Device", "Public IP", "Assigned IP", "Login", "Active", "Usuario"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Machine tunnel VPN ({} connections)", report.reported_total)),
    );
    frame.render_widget(table, area);
}

fn draw_ztna(frame: &mut ratatui::Frame<'_>, area: Rect, report: Option<&ZtnaReport>) {
    let Some(report) = report else {
        return no_data(frame, area, "ZTNA");
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let mut summary = format!(
        "{} -> {}  entries={} new={} persisted={} duplicates={}",
        report.since,
        report.until,
        report.entries_total,
        report.new_entries,
        report.persisted_entries,
        report.boundary_duplicates,
    );
    if report.truncated_windows > 0 {
        summary.push_str(&format!(" truncated={}", report.truncated_windows));
    }
    if !report.failed_windows.is_empty() || !report.snapshot_errors.is_empty() {
        summary.push_str(&format!(
            " failed_windows={} snapshot_errors={}",
            report.failed_windows.len(),
            report.snapshot_errors.len()
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(summary)).block(Block::default().borders(Borders::ALL).title("ZTNA activity")),
        rows[0],
    );

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[1]);

    let bars: Vec<(&str, u64)> = report
        .top_resources
        .iter()
        .take(TOP_RESOURCES)
        .map(|resource| (resource.label.as_str(), resource.count as u64))
        .collect();
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title("Private resource usage"))
        .data(bars.as_slice())
        .bar_width(7)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan));
    frame.render_widget(chart, cols[0]);

    match &report.inactive_resources {
        Some(names) => {
            let table = Table::new(
                names.iter().map(|name| Row::new(vec![name.clone()])),
                [Constraint::Percentage(100)],
            )
            .header(header_row(&["Resource"]))
            .block(Block::default().borders(Borders::ALL).title(format!("Inactive ({})", names.len())));
            frame.render_widget(table, cols[1]);
        }
        None => no_data(frame, cols[1], "Inactive"),
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.to_vec()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
}
