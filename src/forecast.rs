use crate::arima::FittedArima;
use crate::calendar;
use anyhow::Result;
use chrono::NaiveDate;

#[derive(Clone, Debug, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Forecast path dated on the business days after the last observation.
#[derive(Clone, Debug)]
pub struct ForecastData {
    pub points: Vec<ForecastPoint>,
    pub confidence_level: f64,
}

impl ForecastData {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn last(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }
}

pub fn build_forecast(
    fitted: &FittedArima,
    last_date: NaiveDate,
    steps: usize,
    confidence_level: f64,
) -> Result<ForecastData> {
    let values = fitted.forecast_with_interval(steps, confidence_level);
    let dates = calendar::business_days_after(last_date, steps);
    if values.len() != steps || dates.len() != steps {
        return Err(anyhow::anyhow!(
            "forecast produced {} values and {} dates, expected {}",
            values.len(),
            dates.len(),
            steps
        ));
    }
    if let Some(bad) = values.iter().position(|v| !v.mean.is_finite()) {
        return Err(anyhow::anyhow!("forecast diverged at step {}", bad + 1));
    }

    let points = dates
        .into_iter()
        .zip(values)
        .map(|(date, v)| ForecastPoint {
            date,
            value: v.mean,
            lower: v.lower,
            upper: v.upper,
        })
        .collect();

    Ok(ForecastData { points, confidence_level })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arima::{Arima, ArimaOrder};
    use crate::data::StockData;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn thirty_business_days_follow_last_observation() {
        let data = StockData::new_mock("AAPL", date(2022, 1, 1), date(2023, 1, 1));
        let fitted = Arima::new(ArimaOrder::new(5, 1, 0).unwrap())
            .fit(&data.closes())
            .unwrap();
        let last = data.last_date().unwrap();
        let forecast = build_forecast(&fitted, last, 30, 0.95).unwrap();

        assert_eq!(forecast.len(), 30);
        let dates: Vec<NaiveDate> = forecast.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, calendar::business_days_after(last, 30));
        assert!(forecast.points.iter().all(|p| p.date > last));
        assert!(forecast.points.iter().all(|p| p.lower <= p.value && p.value <= p.upper));
        let values: Vec<f64> = forecast.points.iter().map(|p| p.value).collect();
        assert_eq!(values, fitted.forecast(30));
    }

    #[test]
    fn interval_widens_with_horizon() {
        let data = StockData::new_mock("MSFT", date(2021, 1, 1), date(2023, 1, 1));
        let fitted = Arima::new(ArimaOrder::new(5, 1, 0).unwrap())
            .fit(&data.closes())
            .unwrap();
        let forecast = build_forecast(&fitted, data.last_date().unwrap(), 30, 0.95).unwrap();
        let first = &forecast.points[0];
        let last = forecast.last().unwrap();
        assert!(last.upper - last.lower > first.upper - first.lower);
    }
}
