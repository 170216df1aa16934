mod app;
mod arima;
mod calendar;
mod config;
mod data;
mod forecast;
mod gui;
mod pipeline;
mod report;
mod stats;
mod tui;
mod ui;

use anyhow::Context;
use app::App;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use config::DataProviderMode;
use data::DataProvider;
use pipeline::DashboardRequest;
use std::io;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Clone, Debug, ValueEnum)]
enum GuiRendererChoice {
    Auto,
    Wgpu,
    Glow,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stockcast-TUI: fetch daily stock prices, fit ARIMA(5,1,0) and forecast 30 business days",
    after_help = "EXAMPLES:
    # Interactive terminal dashboard
    cargo run --release

    # One-shot report for a ticker
    cargo run --release -- --headless --ticker MSFT --start 2018-01-01 --end 2024-01-01

    # Offline demo with synthetic prices
    cargo run --release -- --gui --mock"
)]
struct Args {
    /// Ticker symbol to prefill
    #[arg(long, default_value = config::DEFAULT_TICKER)]
    ticker: String,

    /// First day of history (YYYY-MM-DD)
    #[arg(long, default_value = config::DEFAULT_START)]
    start: NaiveDate,

    /// Day after the last day of history (YYYY-MM-DD)
    #[arg(long, default_value = config::DEFAULT_END)]
    end: NaiveDate,

    /// Launch in GUI mode
    #[arg(long)]
    gui: bool,

    /// Print a single report to stdout and exit
    #[arg(long, conflicts_with = "gui")]
    headless: bool,

    /// Use the offline synthetic data provider
    #[arg(long)]
    mock: bool,

    /// Use raw prices instead of split/dividend adjusted ones
    #[arg(long)]
    no_adjust: bool,

    /// GUI renderer backend (auto|wgpu|glow). Useful for RDP compatibility.
    #[arg(long, value_enum, default_value_t = GuiRendererChoice::Wgpu)]
    gui_renderer: GuiRendererChoice,

    /// Enable GUI safe mode for remote desktop (disables vsync/MSAA and hardware acceleration).
    #[arg(long)]
    gui_safe_mode: bool,
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("stockcast_tui=info,wgpu_core=error,wgpu_hal=error")
    });

    let (writer, ansi) = match config::log_file_path() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        // The alternate screen owns the terminal; stray log lines would corrupt it.
        None if !args.gui && !args.headless => (BoxMakeWriter::new(io::sink), false),
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args)?;

    let mode = if args.mock {
        DataProviderMode::Mock
    } else {
        config::configured_data_provider_mode()
    };
    let provider = DataProvider::from_mode(mode)?;
    info!("Using {} data provider", provider.name());

    if args.headless {
        let request = DashboardRequest {
            ticker: args.ticker.clone(),
            start: args.start,
            end: args.end,
            auto_adjust: !args.no_adjust,
        };
        if !report::run_headless(&provider, request).await {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut app = App::new(provider).with_inputs(&args.ticker, args.start, args.end);
    app.auto_adjust = !args.no_adjust;

    if args.gui {
        let mut options = eframe::NativeOptions::default();
        options.renderer = match args.gui_renderer {
            GuiRendererChoice::Auto => eframe::Renderer::Wgpu,
            GuiRendererChoice::Wgpu => eframe::Renderer::Wgpu,
            GuiRendererChoice::Glow => eframe::Renderer::Glow,
        };

        if args.gui_safe_mode {
            options.vsync = false;
            options.multisampling = 0;
            options.depth_buffer = 0;
            options.stencil_buffer = 0;
            options.hardware_acceleration = eframe::HardwareAcceleration::Off;
        }

        info!(
            "Launching GUI with renderer: {:?}, safe_mode={}",
            args.gui_renderer,
            args.gui_safe_mode
        );
        eframe::run_native(
            "Stock Price Forecasting Dashboard",
            options,
            Box::new(|_cc| Ok(Box::new(gui::GuiApp::new(app)))),
        )
        .map_err(|e| anyhow::anyhow!("GUI failed: {}", e))?;
        return Ok(());
    }

    let mut terminal = tui::init()?;
    let res = app.run(&mut terminal).await;

    tui::restore()?;

    if let Err(e) = res {
        error!("Error: {:?}", e);
        return Err(e.into());
    }

    Ok(())
}
