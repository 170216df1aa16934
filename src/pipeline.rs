use crate::arima::{Arima, ArimaOrder, ModelSummary};
use crate::config::{ARIMA_ORDER, CONFIDENCE_LEVEL, DATE_FORMAT, FORECAST_STEPS};
use crate::data::{DataProvider, HistoryRequest, StockData};
use crate::forecast::{self, ForecastData};
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Inputs of one "Fetch Data" press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub auto_adjust: bool,
}

impl DashboardRequest {
    pub fn history_request(&self) -> HistoryRequest {
        let mut req = HistoryRequest::new(&self.ticker, self.start, self.end);
        req.auto_adjust = self.auto_adjust;
        req
    }

    /// Ticker as displayed in headings.
    pub fn display_ticker(&self) -> String {
        self.ticker.trim().to_uppercase()
    }
}

/// Everything one run produced, filled in pipeline order.
///
/// When a step fails, `error` is set and every later field stays `None`;
/// earlier fields are kept so the surfaces can keep showing them.
#[derive(Clone, Debug)]
pub struct DashboardRun {
    pub request: DashboardRequest,
    pub data: Option<Arc<StockData>>,
    pub model: Option<ModelSummary>,
    pub forecast: Option<ForecastData>,
    pub error: Option<String>,
}

impl DashboardRun {
    pub fn new(request: DashboardRequest) -> Self {
        Self {
            request,
            data: None,
            model: None,
            forecast: None,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.forecast.is_some()
    }

    fn fail(&mut self, err: &anyhow::Error) {
        error!("Dashboard run for {} failed: {:#}", self.request.display_ticker(), err);
        self.error = Some(error_message(err));
    }
}

pub fn error_message(err: &anyhow::Error) -> String {
    format!("An error occurred: {:#}", err)
}

/// Fetches history and runs the model steps.
pub async fn run_dashboard(provider: &DataProvider, request: DashboardRequest) -> DashboardRun {
    let mut run = DashboardRun::new(request);
    info!(
        "Fetching data for {} ({} .. {}) via {}",
        run.request.display_ticker(),
        run.request.start,
        run.request.end,
        provider.name()
    );

    match provider.fetch_history(&run.request.history_request()).await {
        Ok(data) => {
            run.data = Some(Arc::new(data));
            analyze(&mut run);
        }
        Err(e) => run.fail(&e),
    }
    run
}

/// Model fit and forecast over already-fetched data.
pub fn analyze(run: &mut DashboardRun) {
    let Some(data) = run.data.clone() else {
        return;
    };
    if let Err(e) = fit_and_forecast(run, &data) {
        run.fail(&e);
    }
}

fn fit_and_forecast(run: &mut DashboardRun, data: &StockData) -> Result<()> {
    let (p, d, q) = ARIMA_ORDER;
    let model = Arima::new(ArimaOrder::new(p, d, q)?);
    let closes = data.closes();
    info!("Training {} on {} closing prices", model.order(), closes.len());

    let fitted = model.fit(&closes)?;
    let sample = data.first_date().zip(data.last_date()).map(|(first, last)| {
        (first.format(DATE_FORMAT).to_string(), last.format(DATE_FORMAT).to_string())
    });
    let summary = fitted.summary(&format!("{} Close", data.symbol), sample);
    info!(
        "Fitted {} on {} observations: llf={:.3} aic={:.3} sigma2={:.5}",
        fitted.order(),
        fitted.nobs(),
        fitted.log_likelihood(),
        fitted.aic(),
        fitted.sigma2()
    );
    debug!(
        "Coefficients: ar={:?} ma={:?} const={:?}",
        fitted.ar_coefficients(),
        fitted.ma_coefficients(),
        fitted.constant()
    );
    run.model = Some(summary);

    let last_date = data
        .close_series()
        .last()
        .map(|(date, _)| *date)
        .ok_or_else(|| anyhow::anyhow!("no closing prices to anchor the forecast"))?;
    let forecast = forecast::build_forecast(&fitted, last_date, FORECAST_STEPS, CONFIDENCE_LEVEL)?;
    if let Some(last) = forecast.last() {
        info!(
            "Forecast for {}: {} steps, {:.2} on {}",
            data.symbol,
            forecast.len(),
            last.value,
            last.date
        );
    }
    run.forecast = Some(forecast);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(ticker: &str, start: NaiveDate, end: NaiveDate) -> DashboardRequest {
        DashboardRequest {
            ticker: ticker.to_string(),
            start,
            end,
            auto_adjust: true,
        }
    }

    #[tokio::test]
    async fn default_request_produces_full_dashboard() {
        let req = request("AAPL", date(2015, 1, 1), date(2023, 12, 31));
        let run = run_dashboard(&DataProvider::Mock, req.clone()).await;

        assert!(run.is_complete(), "unexpected error: {:?}", run.error);
        let data = run.data.as_ref().unwrap();
        assert!(data.history.windows(2).all(|w| w[0].date < w[1].date));
        assert!(data.first_date().unwrap() >= req.start);
        assert!(data.last_date().unwrap() < req.end);

        let model = run.model.as_ref().unwrap();
        assert_eq!(model.order.to_string(), "ARIMA(5, 1, 0)");
        assert_eq!(model.nobs, data.closes().len());

        let forecast = run.forecast.as_ref().unwrap();
        let last = data.last_date().unwrap();
        assert_eq!(forecast.len(), 30);
        let dates: Vec<NaiveDate> = forecast.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, calendar::business_days_after(last, 30));
        // No gap: the first forecast date is the next business day.
        assert_eq!(forecast.points[0].date, calendar::business_days_after(last, 1)[0]);
    }

    #[tokio::test]
    async fn reversed_range_fails_at_model_step() {
        let req = request("AAPL", date(2023, 12, 31), date(2015, 1, 1));
        let run = run_dashboard(&DataProvider::Mock, req).await;

        assert!(run.data.as_ref().unwrap().is_empty());
        assert!(run.model.is_none());
        assert!(run.forecast.is_none());
        let message = run.error.unwrap();
        assert!(message.starts_with("An error occurred: "));
        assert!(message.contains("insufficient data"), "{}", message);
    }

    #[tokio::test]
    async fn blank_ticker_yields_single_error() {
        let req = request("", date(2020, 1, 1), date(2021, 1, 1));
        let run = run_dashboard(&DataProvider::Mock, req).await;
        assert!(run.data.is_some());
        assert!(run.forecast.is_none());
        assert_eq!(run.error.iter().count(), 1);
    }

    #[tokio::test]
    async fn short_range_is_insufficient() {
        // One trading week is shorter than the fixed order requires.
        let req = request("AAPL", date(2024, 1, 1), date(2024, 1, 8));
        let run = run_dashboard(&DataProvider::Mock, req).await;
        assert_eq!(run.data.as_ref().unwrap().history.len(), 5);
        assert!(run.error.unwrap().contains("need at least 16 observations, got 5"));
    }

    #[test]
    fn analyze_keeps_fetched_data_on_failure() {
        let mut data = StockData::new_mock("FLAT", date(2022, 1, 1), date(2022, 6, 1));
        for candle in &mut data.history {
            candle.close = 10.0;
        }
        let mut run = DashboardRun::new(request("FLAT", date(2022, 1, 1), date(2022, 6, 1)));
        run.data = Some(Arc::new(data));
        analyze(&mut run);
        assert!(run.data.is_some());
        assert!(run.model.is_none());
        assert!(run.forecast.is_none());
        assert!(run.error.unwrap().contains("singular design matrix"));
    }

    #[test]
    fn error_message_includes_context_chain() {
        let err = anyhow::anyhow!("No data found").context("HTTP 404 Not Found");
        assert_eq!(error_message(&err), "An error occurred: HTTP 404 Not Found: No data found");
    }
}
