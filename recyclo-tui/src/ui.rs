use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};
use recyclo_core::{
    aggregate::{DisplayBundle, FeeSummary, RankedPrediction},
    classifier::ModelStatus,
    model::CollectionCenter,
    service::{Notice, NoticeKind, Severity},
};

use crate::app::{App, Screen};

const BAR_WIDTH: usize = 20;

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("Recyclo: classify an item and find where it goes")
        .block(Block::default().borders(Borders::ALL).title("Recyclo"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::Capture => draw_capture(frame, app, *content_area),
        Screen::Result => draw_result(frame, app, *content_area),
        Screen::CenterDetail => draw_center_detail(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::Capture => "Type an image path · Enter analyze · Ctrl-R reload model · Ctrl-C quit",
        Screen::Result => "↑/↓ move · Enter/→ center details · Esc/←/b new picture · q quit",
        Screen::CenterDetail => "Esc/←/b back to results · q quit",
    };

    let status_text = if app.is_loading() {
        format!("Analyzing… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_capture(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // path
            Constraint::Length(3), // model banner
            Constraint::Min(0),    // notices
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [input_area, model_area, notices_area] = chunks else {
        return;
    };

    let input = Paragraph::new(app.path_input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Image to analyze (path, Enter)"),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(input, *input_area);

    let (banner, color) = model_banner(&app.model);
    let model = Paragraph::new(banner)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Model"))
        .wrap(Wrap { trim: true });
    frame.render_widget(model, *model_area);

    let hint = "No analysis yet. Point to a photo of one item.";
    draw_notices(frame, &app.notices, hint, *notices_area);
}

fn draw_notices(frame: &mut Frame<'_>, notices: &[Notice], empty: &'static str, area: Rect) {
    let items = if notices.is_empty() {
        vec![ListItem::new(empty)]
    } else {
        notices.iter().map(notice_item).collect()
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Messages"));
    frame.render_widget(list, area);
}

fn model_banner(status: &ModelStatus) -> (String, Color) {
    if status.ready {
        return ("Model ready".to_owned(), Color::Green);
    }
    if status.loading {
        return (
            format!(
                "Loading model (attempt {}/{})…",
                status.attempts.max(1),
                status.max_attempts
            ),
            Color::Yellow,
        );
    }
    if status.is_exhausted() {
        let reason = status.error.as_deref().unwrap_or("unknown error");
        return (
            format!("Model failed to load: {reason}. Press Ctrl-R to try again."),
            Color::Red,
        );
    }
    ("Model not loaded yet".to_owned(), Color::Gray)
}

fn notice_item(notice: &Notice) -> ListItem<'_> {
    let color = match notice.severity {
        Severity::Info => Color::Reset,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    };
    ListItem::new(notice.message.as_str()).style(Style::default().fg(color))
}

fn draw_result(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let Some(bundle) = app.bundle() else {
        let paragraph = Paragraph::new("No result yet.")
            .block(Block::default().borders(Borders::ALL).title("Result"));
        frame.render_widget(paragraph, area);
        return;
    };

    let prediction_rows = u16::try_from(bundle.alternatives.len()).unwrap_or(u16::MAX);
    let notice_rows = u16::try_from(app.notices.len()).unwrap_or(u16::MAX);
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(prediction_rows.saturating_add(3)),
            Constraint::Length(5),
            Constraint::Min(0),
            Constraint::Length(notice_rows.saturating_add(2)),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [predictions_area, fee_area, centers_area, notices_area] = chunks else {
        return;
    };

    draw_predictions(frame, bundle, *predictions_area);
    let fee_failure = app.failed_lookup(NoticeKind::FeeLookupFailed);
    draw_fee(frame, &bundle.fee, fee_failure, *fee_area);
    draw_centers(frame, app, bundle, *centers_area);
    draw_notices(frame, &app.notices, "No messages.", *notices_area);
}

fn draw_centers(frame: &mut Frame<'_>, app: &App, bundle: &DisplayBundle, area: Rect) {
    let failure = app.failed_lookup(NoticeKind::CenterLookupFailed);

    let items = if let Some(failure) = failure {
        vec![ListItem::new(failure.message.as_str()).style(Style::default().fg(Color::Red))]
    } else if bundle.has_centers() {
        bundle
            .centers
            .iter()
            .map(|card| {
                let marker = if card.exact_match { "★ " } else { "  " };
                let address = card.center.address.as_deref().unwrap_or("no address");
                ListItem::new(format!("{marker}{} · {address}", card.center.name))
            })
            .collect()
    } else {
        vec![ListItem::new("No collection centers found for this item.")]
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Collection centers (↑/↓, Enter for details)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if failure.is_none() && bundle.has_centers() {
        state.select(Some(app.center_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_predictions(frame: &mut Frame<'_>, bundle: &DisplayBundle, area: Rect) {
    let mut lines = vec![prediction_line(&bundle.top).add_modifier(Modifier::BOLD)];
    lines.extend(
        bundle
            .alternatives
            .iter()
            .map(|alternative| prediction_line(alternative).fg(Color::Gray)),
    );

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("It looks like: {}", bundle.top.label)),
    );
    frame.render_widget(paragraph, area);
}

fn prediction_line(prediction: &RankedPrediction) -> Line<'static> {
    let filled = usize::from(prediction.percent) * BAR_WIDTH / 100;
    let bar = format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH.saturating_sub(filled))
    );
    Line::from(format!(
        "{:<24} {bar} {:>3}%",
        prediction.label, prediction.percent
    ))
}

fn draw_fee(frame: &mut Frame<'_>, fee: &FeeSummary, failure: Option<&Notice>, area: Rect) {
    let lines = if let Some(failure) = failure {
        vec![Line::from(failure.message.clone()).fg(Color::Red)]
    } else if fee.has_fee {
        vec![
            Line::from(format!(
                "Disposal fee: {}",
                format_amount(fee.record.base_amount)
            )),
            Line::from(format!(
                "Center fee:   {}",
                format_amount(fee.record.center_amount)
            )),
            Line::from(format!("Total:        {}", format_amount(Some(fee.total))))
                .add_modifier(Modifier::BOLD),
        ]
    } else {
        vec![Line::from("No fee information for this item.")]
    };

    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Fee"));
    frame.render_widget(paragraph, area);
}

fn format_amount(amount: Option<f64>) -> String {
    match amount {
        Some(value) if value.fract().abs() < f64::EPSILON => format!("{value:.0}"),
        Some(value) => format!("{value:.2}"),
        None => "–".to_owned(),
    }
}

fn draw_center_detail(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let Some(card) = app.selected_center() else {
        let paragraph = Paragraph::new("No center selected.")
            .block(Block::default().borders(Borders::ALL).title("Center"));
        frame.render_widget(paragraph, area);
        return;
    };
    let center = &card.center;

    let show_hours = center.hours.has_any();
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(if show_hours { 10 } else { 0 }),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [info_area, hours_area] = chunks else {
        return;
    };

    let paragraph = Paragraph::new(center_lines(center))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} (Esc/←/b to go back)", center.name)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, *info_area);

    if show_hours {
        let rows = center.hours.iter().map(|(day, hours)| {
            Row::new(vec![
                Cell::from(day.to_string()),
                Cell::from(hours.unwrap_or("–").to_owned()),
            ])
        });
        let table = Table::new(rows, [Constraint::Length(6), Constraint::Min(20)])
            .header(
                Row::new(vec!["Day", "Hours"]).style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::ALL).title("Opening hours"))
            .column_spacing(1);
        frame.render_widget(table, *hours_area);
    }
}

fn center_lines(center: &CollectionCenter) -> Vec<Line<'static>> {
    let field = |name: &str, value: Option<&str>| {
        Line::from(vec![
            Span::styled(format!("{name:<10}"), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(value.unwrap_or("–").to_owned()),
        ])
    };

    let dial = center.dial_number().map(|number| format!("tel:{number}"));
    let maps = center.maps_url().map(String::from);

    vec![
        field("Address", center.address.as_deref()),
        field("Phone", center.phone.as_deref()),
        field("Call", dial.as_deref()),
        field("Parking", center.parking_info.as_deref()),
        field("Accepts", center.accepted_items.as_deref()),
        field("Map", maps.as_deref()),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ratatui::{backend::TestBackend, buffer::Cell as BufferCell};
    use recyclo_classifier_onnx as onnx;
    use recyclo_core::{
        aggregate::aggregate,
        classifier::{ClassifierAdapter, LoadPolicy},
        model::{ClassificationResult, FeeRecord, Prediction},
        ports::ModelAssets,
        resolver::{DEFAULT_LOOKUP_TIMEOUT, LabelResolver},
        service::{CycleReport, RecycloService},
        synonyms::SynonymMap,
    };
    use recyclo_store_supabase as supabase;
    use reqwest::Client;

    use super::*;

    fn offline_service() -> Arc<RecycloService> {
        let client = Client::new();
        let store = supabase::store(client.clone(), "http://localhost:54321", "anon");
        let classifier = Arc::new(ClassifierAdapter::new(
            onnx::loader(client),
            ModelAssets::new("model.onnx", "metadata.json"),
            LoadPolicy::default(),
        ));
        let resolver = Arc::new(LabelResolver::new(
            store.fees,
            store.centers,
            SynonymMap::builtin(),
            DEFAULT_LOOKUP_TIMEOUT,
        ));
        Arc::new(RecycloService::new(classifier, resolver, 2))
    }

    fn notice(severity: Severity, kind: NoticeKind, message: &str) -> Notice {
        Notice {
            severity,
            kind,
            message: message.to_owned(),
        }
    }

    /// App on the result screen for a "pen" with no centers, carrying `notices`.
    fn result_app(fee: FeeRecord, notices: Vec<Notice>) -> App {
        let classification = ClassificationResult::new(vec![
            Prediction::new("pen", 0.9),
            Prediction::new("can", 0.1),
        ])
        .expect("valid predictions");
        let bundle = aggregate(&classification, fee, Vec::new(), 2);

        let mut app = App::new(offline_service(), String::new());
        app.notices.clone_from(&notices);
        app.report = Some(CycleReport {
            cycle: 1,
            bundle: Some(bundle),
            strategy: None,
            notices,
        });
        app.screen = Screen::Result;
        app
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).expect("test terminal");
        terminal.draw(|frame| draw(frame, app)).expect("renders");
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(BufferCell::symbol)
            .collect()
    }

    #[test]
    fn failed_lookups_render_differently_from_empty_ones() {
        let classified = notice(Severity::Info, NoticeKind::Classified, "Best match: pen");
        let failed = render(&result_app(
            FeeRecord::empty("pen"),
            vec![
                classified.clone(),
                notice(
                    Severity::Error,
                    NoticeKind::FeeLookupFailed,
                    "Could not load fee information: fee table offline",
                ),
                notice(
                    Severity::Error,
                    NoticeKind::CenterLookupFailed,
                    "Could not load collection centers: center table offline",
                ),
            ],
        ));
        let none = render(&result_app(
            FeeRecord::empty("pen"),
            vec![
                classified,
                notice(Severity::Info, NoticeKind::NoFee, "No fee is configured."),
                notice(Severity::Info, NoticeKind::NoCenters, "No centers accept it."),
            ],
        ));

        assert_ne!(failed, none);
        assert!(failed.contains("Could not load fee information"));
        assert!(failed.contains("Could not load collection centers"));
        assert!(!failed.contains("No collection centers found for this item."));
        assert!(!failed.contains("No fee information for this item."));

        assert!(none.contains("No collection centers found for this item."));
        assert!(none.contains("No fee information for this item."));
        assert!(none.contains("No centers accept it."));
        assert!(!none.contains("Could not load"));
    }

    #[test]
    fn degraded_fee_keeps_the_amount_and_shows_the_warning() {
        let mut fee = FeeRecord::empty("pen");
        fee.base_amount = Some(3.0);
        let app = result_app(
            fee,
            vec![notice(
                Severity::Warning,
                NoticeKind::FeeLookupFailed,
                "The center fee table is unavailable",
            )],
        );

        assert!(app.failed_lookup(NoticeKind::FeeLookupFailed).is_none());
        let screen = render(&app);
        assert!(screen.contains("Disposal fee: 3"));
        assert!(screen.contains("The center fee table is unavailable"));
    }

    #[test]
    fn amounts_drop_trailing_zero_cents() {
        assert_eq!(format_amount(Some(1500.0)), "1500");
        assert_eq!(format_amount(Some(2.5)), "2.50");
        assert_eq!(format_amount(None), "–");
    }

    #[test]
    fn banner_asks_for_reload_once_attempts_run_out() {
        let status = ModelStatus {
            ready: false,
            loading: false,
            attempts: 3,
            max_attempts: 3,
            error: Some("HTTP 404".to_owned()),
        };
        let (text, color) = model_banner(&status);
        assert!(text.contains("HTTP 404"));
        assert!(text.contains("Ctrl-R"));
        assert_eq!(color, Color::Red);
    }

    #[test]
    fn bar_width_follows_percent() {
        let prediction = RankedPrediction {
            label: "pen".to_owned(),
            confidence: 0.5,
            percent: 50,
        };
        let text = prediction_line(&prediction).to_string();
        assert_eq!(text.matches('█').count(), BAR_WIDTH / 2);
        assert!(text.ends_with(" 50%"));
    }
}
