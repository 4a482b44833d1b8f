use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{BarChart, Block, Borders, List, ListItem, ListState, Paragraph, Sparkline, Wrap},
};
use std::io::stdout;

use crate::db::Database;
use crate::filters::{FilterState, PeriodPreset};
use crate::metrics::{
    self, BucketSize, DistributionSlice, SentimentSummary, TimeBucket, Trend,
};
use crate::models::{
    AnalyzedFeedback, Company, Criticality, FeedbackType, Sentiment, DEFAULT_CHART_COLOR,
    DEPARTMENTS,
};
use crate::report::{self, ExportOutcome, ReportExporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Category,
    Criticality,
    Sentiment,
    Department,
    Theme,
}

enum Entry {
    Header(&'static str),
    Value { dimension: Dimension, key: String, label: String },
}

struct AppState {
    company: Company,
    filters: FilterState,
    entries: Vec<Entry>,
    rows: Vec<AnalyzedFeedback>,
    summary: SentimentSummary,
    trend: Trend,
    series: Vec<TimeBucket>,
    bucket_size: BucketSize,
    by_type: Vec<DistributionSlice>,
    by_sentiment: Vec<DistributionSlice>,
    /// High-criticality counts per week, oldest first.
    high_crit_weeks: Vec<u64>,
    cursor: usize,
    selected_feedback: usize,
    // Reloads are explicit: filter changes bump request_seq and the event
    // loop loads when it trails loaded_seq. A result carrying an older
    // token than the latest request is stale and discarded.
    request_seq: u64,
    loaded_seq: u64,
    status: Option<String>,
}

impl AppState {
    fn new(company: Company, filters: FilterState, themes: Vec<String>) -> Self {
        let entries = build_entries(&themes);
        let cursor = entries
            .iter()
            .position(|e| matches!(e, Entry::Value { .. }))
            .unwrap_or(0);
        Self {
            company,
            filters,
            entries,
            rows: Vec::new(),
            summary: SentimentSummary::default(),
            trend: Trend::Stable,
            series: Vec::new(),
            bucket_size: BucketSize::Day,
            by_type: Vec::new(),
            by_sentiment: Vec::new(),
            high_crit_weeks: Vec::new(),
            cursor,
            selected_feedback: 0,
            request_seq: 1,
            loaded_seq: 0,
            status: None,
        }
    }

    fn request_reload(&mut self) {
        self.request_seq += 1;
    }

    fn reload_if_requested(&mut self, db: &Database) {
        if self.loaded_seq == self.request_seq {
            return;
        }
        let token = self.request_seq;

        match db.list_analyzed(&self.company.slug, &self.filters) {
            Ok(rows) => {
                self.rows = rows;
                self.status = None;
            }
            Err(err) => {
                // Degrade to an empty view; never tear down the dashboard.
                self.rows.clear();
                self.status = Some(format!("Falha ao carregar dados: {err:#}"));
            }
        }

        if token != self.request_seq {
            return; // stale result, a newer request is pending
        }

        let range = self.filters.effective_range();
        self.summary = metrics::sentiment_summary(&self.rows);
        self.trend = metrics::trend(&self.rows);
        self.bucket_size = metrics::bucket_size(&range, &self.rows);
        self.series = metrics::time_series(&self.rows, &range);
        self.by_type = metrics::distribution_by_type(&self.rows);
        self.by_sentiment = metrics::distribution_by_sentiment(&self.rows);
        self.high_crit_weeks = metrics::high_criticality_by_week(&self.rows)
            .into_iter()
            .map(|(_, count)| count as u64)
            .collect();
        if self.selected_feedback >= self.rows.len() {
            self.selected_feedback = self.rows.len().saturating_sub(1);
        }
        self.loaded_seq = token;
    }

    fn cursor_next(&mut self) {
        let mut i = self.cursor;
        while i + 1 < self.entries.len() {
            i += 1;
            if matches!(self.entries[i], Entry::Value { .. }) {
                self.cursor = i;
                return;
            }
        }
    }

    fn cursor_prev(&mut self) {
        let mut i = self.cursor;
        while i > 0 {
            i -= 1;
            if matches!(self.entries[i], Entry::Value { .. }) {
                self.cursor = i;
                return;
            }
        }
    }

    fn toggle_at_cursor(&mut self) {
        let Some(Entry::Value { dimension, key, .. }) = self.entries.get(self.cursor) else {
            return;
        };
        let (dimension, key) = (*dimension, key.clone());
        match dimension {
            Dimension::Category => self.filters.toggle_category(&key),
            Dimension::Criticality => self.filters.toggle_criticality(&key),
            Dimension::Sentiment => self.filters.toggle_sentiment(&key),
            Dimension::Department => self.filters.toggle_department(&key),
            Dimension::Theme => self.filters.toggle_theme(&key),
        }
        self.request_reload();
    }

    fn is_selected(&self, dimension: Dimension, key: &str) -> bool {
        let list = match dimension {
            Dimension::Category => &self.filters.categories,
            Dimension::Criticality => &self.filters.criticalities,
            Dimension::Sentiment => &self.filters.sentiments,
            Dimension::Department => &self.filters.departments,
            Dimension::Theme => &self.filters.themes,
        };
        list.iter().any(|v| v == key)
    }

    fn feedback_next(&mut self) {
        if !self.rows.is_empty() && self.selected_feedback < self.rows.len() - 1 {
            self.selected_feedback += 1;
        }
    }

    fn feedback_prev(&mut self) {
        if self.selected_feedback > 0 {
            self.selected_feedback -= 1;
        }
    }

    fn export_report(&mut self) {
        let mut exporter = ReportExporter::from_env();
        let output = std::path::PathBuf::from(format!("relatorio-{}.pdf", self.company.slug));
        let result = exporter.export(&self.company, &self.filters, &output);
        self.status = Some(match result {
            Ok(ExportOutcome::Saved(path)) => format!("Relatório salvo em {}", path.display()),
            Ok(ExportOutcome::Accepted) => "Relatório solicitado; processamento assíncrono".to_string(),
            Err(err) => format!("Falha na exportação: {err:#}"),
        });
        exporter.acknowledge();
    }

    fn export_csv(&mut self) {
        if self.rows.is_empty() {
            self.status = Some("Nenhum feedback para exportar".to_string());
            return;
        }
        let output = std::path::PathBuf::from(format!("feedbacks-{}.csv", self.company.slug));
        self.status = Some(match report::write_feedbacks_csv(&self.rows, &output) {
            Ok(count) => format!("{} feedbacks exportados para {}", count, output.display()),
            Err(err) => format!("Falha na exportação CSV: {err:#}"),
        });
    }
}

fn build_entries(themes: &[String]) -> Vec<Entry> {
    let mut entries = Vec::new();

    entries.push(Entry::Header("Categoria"));
    for t in FeedbackType::ALL {
        entries.push(Entry::Value {
            dimension: Dimension::Category,
            key: t.key().to_string(),
            label: t.label().to_string(),
        });
    }

    entries.push(Entry::Header("Criticidade"));
    for c in Criticality::ALL {
        entries.push(Entry::Value {
            dimension: Dimension::Criticality,
            key: c.key().to_string(),
            label: c.label().to_string(),
        });
    }

    entries.push(Entry::Header("Sentimento"));
    for s in Sentiment::ALL {
        entries.push(Entry::Value {
            dimension: Dimension::Sentiment,
            key: s.key().to_string(),
            label: s.label().to_string(),
        });
    }

    entries.push(Entry::Header("Setor"));
    for d in DEPARTMENTS {
        entries.push(Entry::Value {
            dimension: Dimension::Department,
            key: d.to_string(),
            label: d.to_string(),
        });
    }

    if !themes.is_empty() {
        entries.push(Entry::Header("Tema"));
        for theme in themes {
            entries.push(Entry::Value {
                dimension: Dimension::Theme,
                key: theme.clone(),
                label: theme.clone(),
            });
        }
    }

    entries
}

pub fn run_dashboard(db: &Database, company: &Company, filters: FilterState) -> Result<()> {
    let themes = db.list_themes(&company.slug).unwrap_or_default();
    let mut state = AppState::new(company.clone(), filters, themes);
    state.reload_if_requested(db);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(Some(state.cursor));
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.cursor_next(),
                KeyCode::Up | KeyCode::Char('k') => state.cursor_prev(),
                KeyCode::Enter | KeyCode::Char(' ') => state.toggle_at_cursor(),
                KeyCode::Char('1') => {
                    state.filters.set_preset(PeriodPreset::Days7);
                    state.request_reload();
                }
                KeyCode::Char('2') => {
                    state.filters.set_preset(PeriodPreset::Days30);
                    state.request_reload();
                }
                KeyCode::Char('3') => {
                    state.filters.set_preset(PeriodPreset::Days90);
                    state.request_reload();
                }
                KeyCode::Char('r') => {
                    state.filters.reset();
                    state.request_reload();
                }
                KeyCode::Char('J') | KeyCode::PageDown => state.feedback_next(),
                KeyCode::Char('K') | KeyCode::PageUp => state.feedback_prev(),
                KeyCode::Char('e') => state.export_report(),
                KeyCode::Char('c') => state.export_csv(),
                _ => {}
            }
            state.reload_if_requested(db);
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_metric_cards(frame, rows[0], state);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(rows[1]);

    draw_filter_panel(frame, body[0], state, list_state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(body[1]);

    draw_time_series(frame, right[0], state);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(right[1]);

    draw_distribution(frame, bottom[0], state);
    draw_feedback_detail(frame, bottom[1], state);

    let help = match &state.status {
        Some(message) => Paragraph::new(message.as_str()).style(Style::default().fg(Color::Yellow)),
        None => Paragraph::new(
            " j/k:filtros  espaço:alternar  1/2/3:período  r:limpar  J/K:feedbacks  e:relatório  c:csv  q:sair",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(help, rows[2]);
}

fn draw_metric_cards(frame: &mut Frame, area: Rect, state: &AppState) {
    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ])
        .split(area);

    let summary = &state.summary;
    let rate = format!("{}% {}", summary.positive_rate, state.trend.arrow());

    metric_card(frame, cards[0], "Total", &summary.total.to_string(), Color::White);
    metric_card(frame, cards[1], "Taxa positiva", &rate, trend_color(state.trend));
    metric_card(frame, cards[2], "Positivos", &summary.positive.to_string(), Color::Green);
    metric_card(frame, cards[3], "Negativos", &summary.negative.to_string(), Color::Red);

    // Weekly high-criticality counts as a sparkline.
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(" Crítica/semana "))
        .style(Style::default().fg(Color::Red))
        .data(state.high_crit_weeks.iter().copied());
    frame.render_widget(sparkline, cards[4]);
}

fn metric_card(frame: &mut Frame, area: Rect, title: &str, value: &str, color: Color) {
    let card = Paragraph::new(Line::from(Span::styled(
        value.to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)));
    frame.render_widget(card, area);
}

fn trend_color(trend: Trend) -> Color {
    match trend {
        Trend::Up => Color::Green,
        Trend::Down => Color::Red,
        Trend::Stable => Color::White,
    }
}

fn draw_filter_panel(frame: &mut Frame, area: Rect, state: &AppState, list_state: &mut ListState) {
    let items: Vec<ListItem> = state
        .entries
        .iter()
        .map(|entry| match entry {
            Entry::Header(title) => ListItem::new(Span::styled(
                title.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Entry::Value { dimension, key, label } => {
                let mark = if state.is_selected(*dimension, key) { "[x]" } else { "[ ]" };
                ListItem::new(format!("  {} {}", mark, label))
            }
        })
        .collect();

    let title = format!(
        " Filtros: {}{} ",
        state.filters.preset.label(),
        if state.filters.has_active_filters() { " *" } else { "" }
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, list_state);
}

fn draw_time_series(frame: &mut Frame, area: Rect, state: &AppState) {
    let title = match state.bucket_size {
        BucketSize::Day => " Feedbacks por dia ",
        BucketSize::Week => " Feedbacks por semana ",
    };

    if state.series.is_empty() {
        let empty = Paragraph::new("Nenhum feedback registrado para o filtro atual")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    }

    let labels: Vec<String> = state
        .series
        .iter()
        .map(|b| b.start.format("%d/%m").to_string())
        .collect();
    let data: Vec<(&str, u64)> = labels
        .iter()
        .zip(&state.series)
        .map(|(label, bucket)| (label.as_str(), bucket.total as u64))
        .collect();

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .bar_width(5)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Blue))
        .value_style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD))
        .data(data.as_slice());

    frame.render_widget(chart, area);
}

fn draw_distribution(frame: &mut Frame, area: Rect, state: &AppState) {
    let halves = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    distribution_list(frame, halves[0], " Por categoria ", &state.by_type);
    distribution_list(frame, halves[1], " Por sentimento ", &state.by_sentiment);
}

fn distribution_list(frame: &mut Frame, area: Rect, title: &str, slices: &[DistributionSlice]) {
    let max = slices.iter().map(|s| s.count).max().unwrap_or(0);
    let items: Vec<ListItem> = slices
        .iter()
        .map(|slice| {
            let width = if max == 0 { 0 } else { slice.count * 12 / max };
            let bar = "█".repeat(width.max(1));
            ListItem::new(Line::from(vec![
                Span::styled(bar, Style::default().fg(hex_color(slice.color))),
                Span::raw(format!(" {} ({})", slice.label, slice.count)),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title.to_string()));
    frame.render_widget(list, area);
}

fn draw_feedback_detail(frame: &mut Frame, area: Rect, state: &AppState) {
    let title = format!(
        " Feedbacks recentes ({}/{}) ",
        if state.rows.is_empty() { 0 } else { state.selected_feedback + 1 },
        state.rows.len()
    );

    let detail = build_detail(state);
    let widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(widget, area);
}

fn build_detail(state: &AppState) -> Text<'static> {
    let Some(row) = state.rows.get(state.selected_feedback) else {
        return Text::raw("Nenhum feedback selecionado");
    };

    let mut lines: Vec<Line> = Vec::new();

    let sentiment_style = match Sentiment::parse(&row.sentiment) {
        Some(s) => Style::default().fg(hex_color(s.color())),
        None => Style::default().fg(hex_color(DEFAULT_CHART_COLOR)),
    };
    let type_label = FeedbackType::parse(&row.classified_type)
        .map(|t| t.label().to_string())
        .unwrap_or_else(|| row.classified_type.clone());
    let criticality_label = Criticality::parse(&row.criticality)
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| row.criticality.clone());

    lines.push(Line::from(vec![
        Span::styled(row.sentiment.clone(), sentiment_style.add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "  {} | {} | Criticidade: {}",
            type_label, row.department, criticality_label
        )),
    ]));
    if let Some(theme) = &row.main_theme {
        lines.push(Line::from(format!("Tema: {}", theme)));
    }
    lines.push(Line::from(Span::styled(
        row.created_at.format("%d/%m/%Y %H:%M").to_string(),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));

    if let Some(summary) = &row.executive_summary {
        lines.push(Line::from(Span::styled(
            "Resumo",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(summary, 70).lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::from(""));
    }

    for line in textwrap::fill(&row.feedback, 70).lines() {
        lines.push(Line::from(format!("\"{}\"", line)));
    }

    Text::from(lines)
}

fn hex_color(hex: &str) -> Color {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return Color::Gray;
    }
    match (
        u8::from_str_radix(&hex[0..2], 16),
        u8::from_str_radix(&hex[2..4], 16),
        u8::from_str_radix(&hex[4..6], 16),
    ) {
        (Ok(r), Ok(g), Ok(b)) => Color::Rgb(r, g, b),
        _ => Color::Gray,
    }
}
