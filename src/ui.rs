use crate::app::{App, AppState, InputField};
use crate::config::{DATE_FORMAT, TAIL_ROWS};
use crate::data::StockData;
use crate::forecast::ForecastData;
use crate::pipeline::DashboardRun;
use chrono::{Datelike, NaiveDate};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, Wrap},
};

pub fn render(f: &mut Frame, app: &App) {
    let error = app.current_error();
    let mut constraints = vec![
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ];
    if error.is_some() {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Length(3));

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    render_header(f, app, layout[0]);
    render_inputs(f, app, layout[1]);

    match app.state {
        AppState::Input => render_welcome(f, layout[2]),
        AppState::Loading => render_loading(f, "Fetching market data and training ARIMA model...", layout[2]),
        AppState::Dashboard => {
            if let Some(run) = &app.run {
                render_dashboard(f, app, run, layout[2]);
            }
        }
    }

    if let Some(err) = error {
        render_error(f, err, layout[3]);
    }
    render_footer(f, app, layout[layout.len() - 1]);
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            " Stock Price Forecasting Dashboard ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(
            match app.state {
                AppState::Input => "Input",
                AppState::Loading => "Loading",
                AppState::Dashboard => "Dashboard",
            },
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(" | "),
        Span::styled(app.provider_name(), Style::default().fg(Color::Gray)),
    ];

    if let Some(data) = app.run.as_ref().and_then(|r| r.data.as_ref()) {
        if let Some(last) = data.history.last() {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(
                format!("{} ${:.2}", data.symbol, last.close),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ));

            if data.history.len() >= 2 {
                let prev = data.history[data.history.len() - 2].close;
                let delta = last.close - prev;
                let pct = delta / prev * 100.0;
                let color = if delta >= 0.0 { Color::Green } else { Color::Red };
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    format!("({:+.2}, {:+.2}%)", delta, pct),
                    Style::default().fg(color),
                ));
            }
        }
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_inputs(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(20),
        ])
        .split(area);

    let fields = [
        (InputField::Ticker, app.ticker.as_str()),
        (InputField::Start, app.start.as_str()),
        (InputField::End, app.end.as_str()),
    ];
    for (idx, (field, value)) in fields.iter().enumerate() {
        let focused = app.focus == *field;
        let mut text = value.to_string();
        if focused {
            text.push('_');
        }
        let input = Paragraph::new(text)
            .style(Style::default().fg(if focused { Color::Yellow } else { Color::White }))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(focus_style(focused))
                    .title(format!(" {} ", field.label())),
            );
        f.render_widget(input, chunks[idx]);
    }

    let focused = app.focus == InputField::Fetch;
    let label = if app.is_loading() { "[ Loading... ]" } else { "[ Fetch Data ]" };
    let button = Paragraph::new(label)
        .alignment(Alignment::Center)
        .style(if focused {
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        })
        .block(Block::default().borders(Borders::ALL).border_style(focus_style(focused)));
    f.render_widget(button, chunks[3]);
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn render_welcome(f: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Enter a ticker and a date range, then press Enter to fetch data.",
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            "The closing prices are fitted with ARIMA(5, 1, 0) and projected 30 business days ahead.",
            Style::default().fg(Color::Gray),
        )),
    ];
    let block = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(block, area);
}

fn render_loading(f: &mut Frame, msg: &str, area: Rect) {
    let block = Block::default().borders(Borders::ALL);
    let text = Paragraph::new(msg)
        .alignment(Alignment::Center)
        .block(block);
    f.render_widget(text, area);
}

fn render_error(f: &mut Frame, err: &str, area: Rect) {
    let error = Paragraph::new(err)
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Error "));
    f.render_widget(error, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let hint = match app.state {
        AppState::Loading => "Loading... | Esc: quit",
        _ => "Tab/Shift-Tab: move | Enter: fetch data | PgUp/PgDn: scroll summary | Esc: quit",
    };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Controls: ", Style::default().fg(Color::Gray)),
        Span::styled(hint, Style::default().fg(Color::White)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

fn render_dashboard(f: &mut Frame, app: &App, run: &DashboardRun, area: Rect) {
    let Some(data) = &run.data else {
        return;
    };
    let ticker = run.request.display_ticker();

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(TAIL_ROWS as u16 + 3), Constraint::Min(0)])
        .split(columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    render_tail_table(f, &ticker, data, left[0]);
    render_history_chart(f, data, right[0]);

    let model_block = Block::default().borders(Borders::ALL);
    match &run.model {
        Some(model) => {
            let summary = Paragraph::new(format!("ARIMA Model Summary:\n{}", model))
                .scroll((app.summary_scroll, 0))
                .block(model_block.title(" Training ARIMA Model (PgUp/PgDn) "));
            f.render_widget(summary, left[1]);
        }
        None => f.render_widget(model_block.title(" Training ARIMA Model "), left[1]),
    }

    if let Some(forecast) = &run.forecast {
        render_forecast_chart(f, &ticker, data, forecast, right[1]);
    }
}

fn render_tail_table(f: &mut Frame, ticker: &str, data: &StockData, area: Rect) {
    let header = Row::new(["Date", "Open", "High", "Low", "Close", "Volume"].map(|h| {
        Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    }));

    let rows: Vec<Row> = data
        .tail(TAIL_ROWS)
        .iter()
        .map(|c| {
            Row::new(vec![
                Cell::from(c.date.format(DATE_FORMAT).to_string()),
                Cell::from(format_price(c.open)),
                Cell::from(format_price(c.high)),
                Cell::from(format_price(c.low)),
                Cell::from(format_price(c.close)),
                Cell::from(if c.volume.is_finite() { format!("{:.0}", c.volume) } else { "NaN".to_string() }),
            ])
        })
        .collect();

    let title = if data.is_empty() {
        format!(" Historical Data for {} (no rows) ", ticker)
    } else {
        format!(" Historical Data for {} ({} rows) ", ticker, data.history.len())
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn format_price(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "NaN".to_string()
    }
}

fn date_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

fn close_points(data: &StockData) -> Vec<(f64, f64)> {
    data.close_series()
        .into_iter()
        .map(|(date, close)| (date_x(date), close))
        .collect()
}

fn price_bounds<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if min.is_finite() && max.is_finite() {
        (min * 0.95, max * 1.05)
    } else {
        (0.0, 1.0)
    }
}

fn date_axis(first: NaiveDate, last: NaiveDate) -> Axis<'static> {
    Axis::default()
        .title("Date")
        .style(Style::default().fg(Color::Gray))
        .bounds([date_x(first), date_x(last).max(date_x(first) + 1.0)])
        .labels(vec![
            Span::styled(first.format(DATE_FORMAT).to_string(), Style::default().fg(Color::Gray)),
            Span::styled(last.format(DATE_FORMAT).to_string(), Style::default().fg(Color::Gray)),
        ])
}

fn price_axis(min: f64, max: f64) -> Axis<'static> {
    Axis::default()
        .title("Price")
        .style(Style::default().fg(Color::Gray))
        .bounds([min, max])
        .labels(vec![
            Span::styled(format!("{:.1}", min), Style::default().fg(Color::Gray)),
            Span::styled(format!("{:.1}", max), Style::default().fg(Color::Gray)),
        ])
}

fn render_history_chart(f: &mut Frame, data: &StockData, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            " Historical Closing Prices ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let points = close_points(data);
    let (Some(first), Some(last)) = (data.first_date(), data.last_date()) else {
        f.render_widget(
            Paragraph::new("No price data returned for this range.")
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        return;
    };

    let (min_price, max_price) = price_bounds(points.iter().map(|(_, y)| y));
    let datasets = vec![Dataset::default()
        .name("Close")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points)];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(date_axis(first, last))
        .y_axis(price_axis(min_price, max_price));
    f.render_widget(chart, area);
}

fn render_forecast_chart(f: &mut Frame, ticker: &str, data: &StockData, forecast: &ForecastData, area: Rect) {
    let actual = close_points(data);
    let predicted: Vec<(f64, f64)> = forecast
        .points
        .iter()
        .map(|p| (date_x(p.date), p.value))
        .collect();
    let upper: Vec<(f64, f64)> = forecast.points.iter().map(|p| (date_x(p.date), p.upper)).collect();
    let lower: Vec<(f64, f64)> = forecast.points.iter().map(|p| (date_x(p.date), p.lower)).collect();

    let band_label = format!("{:.0}% interval", forecast.confidence_level * 100.0);
    let datasets = vec![
        Dataset::default()
            .name("Actual Prices")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&actual),
        Dataset::default()
            .name(band_label)
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::DarkGray))
            .data(&upper),
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::DarkGray))
            .data(&lower),
        // Scattered dots stand in for a dashed line.
        Dataset::default()
            .name("Forecasted Prices")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Yellow))
            .data(&predicted),
    ];

    let first = data.first_date().unwrap_or_default();
    let last = forecast.last().map(|p| p.date).unwrap_or(first);
    let (min_price, max_price) = price_bounds(
        actual
            .iter()
            .map(|(_, y)| y)
            .chain(upper.iter().map(|(_, y)| y))
            .chain(lower.iter().map(|(_, y)| y)),
    );

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    format!(" {} Price Forecast ", ticker),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(date_axis(first, last))
        .y_axis(price_axis(min_price, max_price));

    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataProvider;
    use crate::pipeline::{self, DashboardRequest};
    use ratatui::{Terminal, backend::TestBackend};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[tokio::test]
    async fn input_screen_shows_defaults() {
        let app = App::new(DataProvider::Mock);
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("AAPL"));
        assert!(text.contains("2015-01-01"));
        assert!(text.contains("2023-12-31"));
        assert!(text.contains("Fetch Data"));
    }

    #[tokio::test]
    async fn dashboard_renders_all_sections() {
        let mut app = App::new(DataProvider::Mock);
        let request = app.build_request().unwrap();
        app.run = Some(pipeline::run_dashboard(&DataProvider::Mock, request).await);
        app.state = AppState::Dashboard;

        let mut terminal = Terminal::new(TestBackend::new(180, 50)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("Historical Data for AAPL"));
        assert!(text.contains("Historical Closing Prices"));
        assert!(text.contains("ARIMA Model Summary"));
        assert!(text.contains("AAPL Price Forecast"));
        assert!(!text.contains("An error occurred"));
    }

    #[tokio::test]
    async fn failed_run_shows_single_error_and_no_forecast() {
        let mut app = App::new(DataProvider::Mock);
        let request = DashboardRequest {
            ticker: "AAPL".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            auto_adjust: true,
        };
        app.run = Some(pipeline::run_dashboard(&DataProvider::Mock, request).await);
        app.state = AppState::Dashboard;

        let mut terminal = Terminal::new(TestBackend::new(180, 50)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();
        let text = buffer_text(&terminal);
        assert_eq!(text.matches("An error occurred").count(), 1);
        assert!(text.contains("no rows"));
        assert!(text.contains("Training ARIMA Model"));
        assert!(!text.contains("ARIMA Model Summary"));
        assert!(!text.contains("AAPL Price Forecast"));
    }
}
