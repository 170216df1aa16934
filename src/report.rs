use crate::config::{DATE_FORMAT, TAIL_ROWS};
use crate::data::{DataProvider, StockData};
use crate::forecast::ForecastData;
use crate::pipeline::{self, DashboardRequest, DashboardRun};
use std::fmt::Write;
use tracing::info;

/// Runs one dashboard pass and prints every produced section to stdout.
/// Returns whether the run completed without error.
pub async fn run_headless(provider: &DataProvider, request: DashboardRequest) -> bool {
    let run = pipeline::run_dashboard(provider, request).await;
    print!("{}", render_report(&run));
    info!("Headless report finished (complete={})", run.is_complete());
    run.is_complete()
}

pub fn render_report(run: &DashboardRun) -> String {
    let mut out = String::new();
    let ticker = run.request.display_ticker();
    let _ = writeln!(out, "Stock Price Forecasting Dashboard");
    let _ = writeln!(out);

    if let Some(data) = &run.data {
        let _ = writeln!(out, "Historical Data for {}", ticker);
        out.push_str(&format_tail_table(data, TAIL_ROWS));
        let _ = writeln!(out);

        let _ = writeln!(out, "Historical Closing Prices");
        let closes = data.closes();
        match (data.first_date(), data.last_date()) {
            (Some(first), Some(last)) if !closes.is_empty() => {
                let (lo, hi) = closes
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
                let _ = writeln!(
                    out,
                    "{} closes from {} to {}, range {:.2} .. {:.2}",
                    closes.len(),
                    first.format(DATE_FORMAT),
                    last.format(DATE_FORMAT),
                    lo,
                    hi
                );
            }
            _ => {
                let _ = writeln!(out, "(no data)");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Training ARIMA Model");
    }

    if let Some(model) = &run.model {
        let _ = writeln!(out, "ARIMA Model Summary:");
        let _ = writeln!(out, "{}", model);
        let _ = writeln!(out);
    }

    if let Some(forecast) = &run.forecast {
        let _ = writeln!(out, "Stock Price Forecast");
        let _ = writeln!(out, "{} Price Forecast", ticker);
        out.push_str(&format_forecast_table(forecast));
        let _ = writeln!(out);
    }

    if let Some(err) = &run.error {
        let _ = writeln!(out, "{}", err);
    }
    out
}

pub fn format_tail_table(data: &StockData, n: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>14}",
        "Date", "Open", "High", "Low", "Close", "Volume"
    );
    for c in data.tail(n) {
        let _ = writeln!(
            out,
            "{:<10} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>14.0}",
            c.date.format(DATE_FORMAT),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        );
    }
    out
}

pub fn format_forecast_table(forecast: &ForecastData) -> String {
    let mut out = String::new();
    let pct = forecast.confidence_level * 100.0;
    let _ = writeln!(
        out,
        "{:<10} {:>12} {:>12} {:>12}",
        "Date",
        "Forecast",
        format!("Lower {:.0}%", pct),
        format!("Upper {:.0}%", pct)
    );
    for p in &forecast.points {
        let _ = writeln!(
            out,
            "{:<10} {:>12.4} {:>12.4} {:>12.4}",
            p.date.format(DATE_FORMAT),
            p.value,
            p.lower,
            p.upper
        );
    }
    out
}
