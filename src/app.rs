use crate::config::{DATE_FORMAT, DEFAULT_END, DEFAULT_START, DEFAULT_TICKER};
use crate::data::DataProvider;
use crate::pipeline::{self, DashboardRequest, DashboardRun};
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Input,
    Loading,
    Dashboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputField {
    Ticker,
    Start,
    End,
    Fetch,
}

impl InputField {
    pub fn next(self) -> Self {
        match self {
            Self::Ticker => Self::Start,
            Self::Start => Self::End,
            Self::End => Self::Fetch,
            Self::Fetch => Self::Ticker,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Self::Ticker => Self::Fetch,
            Self::Start => Self::Ticker,
            Self::End => Self::Start,
            Self::Fetch => Self::End,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ticker => "Enter Stock Ticker",
            Self::Start => "Start Date",
            Self::End => "End Date",
            Self::Fetch => "Fetch Data",
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub ticker: String,
    pub start: String,
    pub end: String,
    pub focus: InputField,
    pub auto_adjust: bool,
    pub run: Option<DashboardRun>,
    pub error_msg: Option<String>,
    pub summary_scroll: u16,
    provider: Arc<DataProvider>,
    runtime: Handle,
    result_rx: Option<mpsc::Receiver<DashboardRun>>,
}

impl App {
    /// Must be called from within a tokio runtime.
    pub fn new(provider: DataProvider) -> Self {
        Self {
            should_quit: false,
            state: AppState::Input,
            ticker: DEFAULT_TICKER.to_string(),
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
            focus: InputField::Ticker,
            auto_adjust: true,
            run: None,
            error_msg: None,
            summary_scroll: 0,
            provider: Arc::new(provider),
            runtime: Handle::current(),
            result_rx: None,
        }
    }

    pub fn with_inputs(mut self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Self {
        self.ticker = ticker.to_string();
        self.start = start.format(DATE_FORMAT).to_string();
        self.end = end.format(DATE_FORMAT).to_string();
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn focused_input_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            InputField::Ticker => Some(&mut self.ticker),
            InputField::Start => Some(&mut self.start),
            InputField::End => Some(&mut self.end),
            InputField::Fetch => None,
        }
    }

    pub fn build_request(&self) -> Result<DashboardRequest> {
        Ok(DashboardRequest {
            ticker: self.ticker.clone(),
            start: parse_date_input("start", &self.start)?,
            end: parse_date_input("end", &self.end)?,
            auto_adjust: self.auto_adjust,
        })
    }

    /// Starts a fresh run from the current inputs, discarding the previous one.
    pub fn trigger_fetch(&mut self) {
        if self.state == AppState::Loading {
            return;
        }

        self.run = None;
        self.error_msg = None;
        self.summary_scroll = 0;

        let request = match self.build_request() {
            Ok(req) => req,
            Err(e) => {
                self.error_msg = Some(pipeline::error_message(&e));
                self.state = AppState::Input;
                return;
            }
        };

        info!("Fetch Data pressed for {}", request.display_ticker());
        let (tx, rx) = mpsc::channel(1);
        let provider = self.provider.clone();
        self.runtime.spawn(async move {
            let run = pipeline::run_dashboard(&provider, request).await;
            let _ = tx.send(run).await;
        });
        self.result_rx = Some(rx);
        self.state = AppState::Loading;
    }

    /// Collects a finished run, if any. Called once per frame.
    pub fn tick(&mut self) {
        let Some(rx) = &mut self.result_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(run) => {
                self.run = Some(run);
                self.state = AppState::Dashboard;
                self.result_rx = None;
            }
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.error_msg = Some("An error occurred: pipeline task ended without a result".to_string());
                self.state = AppState::Input;
                self.result_rx = None;
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == AppState::Loading
    }

    /// The error banner text, whichever step produced it.
    pub fn current_error(&self) -> Option<&str> {
        self.error_msg
            .as_deref()
            .or_else(|| self.run.as_ref().and_then(|r| r.error.as_deref()))
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        match code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => self.should_quit = true,
            KeyCode::Tab | KeyCode::Down => self.focus = self.focus.next(),
            KeyCode::BackTab | KeyCode::Up => self.focus = self.focus.prev(),
            KeyCode::Enter => self.trigger_fetch(),
            KeyCode::PageDown => self.summary_scroll = self.summary_scroll.saturating_add(5),
            KeyCode::PageUp => self.summary_scroll = self.summary_scroll.saturating_sub(5),
            KeyCode::Backspace => {
                if let Some(field) = self.focused_input_mut() {
                    field.pop();
                }
            }
            KeyCode::Char(' ') if self.focus == InputField::Fetch => self.trigger_fetch(),
            KeyCode::Char(c) => {
                if let Some(field) = self.focused_input_mut() {
                    field.push(c);
                }
            }
            _ => {}
        }
    }

    pub async fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        while !self.should_quit {
            self.tick();
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code, key.modifiers);
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }
}

fn parse_date_input(which: &str, input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| anyhow!("Invalid {} date '{}', use YYYY-MM-DD", which, trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_match_dashboard_defaults() {
        let app = App::new(DataProvider::Mock);
        let req = app.build_request().unwrap();
        assert_eq!(req.ticker, "AAPL");
        assert_eq!(req.start, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(req.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(app.state, AppState::Input);
    }

    #[tokio::test]
    async fn focus_cycles_through_fields() {
        let mut app = App::new(DataProvider::Mock);
        let mut seen = vec![app.focus];
        for _ in 0..4 {
            app.handle_key(KeyCode::Tab, KeyModifiers::NONE);
            seen.push(app.focus);
        }
        assert_eq!(
            seen,
            vec![InputField::Ticker, InputField::Start, InputField::End, InputField::Fetch, InputField::Ticker]
        );
        app.handle_key(KeyCode::BackTab, KeyModifiers::NONE);
        assert_eq!(app.focus, InputField::Fetch);
    }

    #[tokio::test]
    async fn typing_edits_focused_field() {
        let mut app = App::new(DataProvider::Mock);
        app.handle_key(KeyCode::Backspace, KeyModifiers::NONE);
        app.handle_key(KeyCode::Char('X'), KeyModifiers::NONE);
        assert_eq!(app.ticker, "AAPX");
    }

    #[tokio::test]
    async fn invalid_date_reports_error_without_fetching() {
        let mut app = App::new(DataProvider::Mock);
        app.start = "2015-13-01".to_string();
        app.trigger_fetch();
        assert_eq!(app.state, AppState::Input);
        assert!(app.run.is_none());
        assert_eq!(
            app.current_error(),
            Some("An error occurred: Invalid start date '2015-13-01', use YYYY-MM-DD")
        );
    }

    #[tokio::test]
    async fn fetch_completes_into_dashboard() {
        let mut app = App::new(DataProvider::Mock);
        app.end = "2016-06-30".to_string();
        app.trigger_fetch();
        assert!(app.is_loading());

        for _ in 0..500 {
            app.tick();
            if app.state == AppState::Dashboard {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(app.state, AppState::Dashboard);
        let run = app.run.as_ref().unwrap();
        assert!(run.is_complete());
        assert_eq!(run.forecast.as_ref().unwrap().len(), 30);
        assert!(app.current_error().is_none());
    }

    #[tokio::test]
    async fn escape_quits() {
        let mut app = App::new(DataProvider::Mock);
        app.handle_key(KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.should_quit);
    }
}
