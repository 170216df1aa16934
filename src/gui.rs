use crate::app::{App, AppState};
use crate::config::{DATE_FORMAT, TAIL_ROWS};
use crate::data::StockData;
use crate::forecast::ForecastData;
use crate::pipeline::DashboardRun;
use chrono::{Datelike, NaiveDate};
use eframe::egui;
use egui_plot::{Legend, Line, LineStyle, Plot, PlotPoints, Polygon};

// ──────────────────────────────────────────────────────────────────────────────
// Color Palette
// ──────────────────────────────────────────────────────────────────────────────

const ACCENT_BLUE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const ACCENT_RED: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const ACCENT_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);
const ACCENT_CYAN: egui::Color32 = egui::Color32::from_rgb(34, 211, 238);

const BG_DARK: egui::Color32 = egui::Color32::from_rgb(15, 15, 20);
const BG_CARD: egui::Color32 = egui::Color32::from_rgb(24, 24, 32);
const BG_ELEVATED: egui::Color32 = egui::Color32::from_rgb(32, 32, 44);
const BG_HOVER: egui::Color32 = egui::Color32::from_rgb(45, 45, 60);
const TEXT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(226, 232, 240);
const TEXT_SECONDARY: egui::Color32 = egui::Color32::from_rgb(148, 163, 184);
const BORDER_SUBTLE: egui::Color32 = egui::Color32::from_rgb(51, 51, 68);

const PLOT_HEIGHT: f32 = 280.0;

pub struct GuiApp {
    app: App,
}

impl GuiApp {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    fn apply_theme(ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        let visuals = &mut style.visuals;
        visuals.dark_mode = true;
        visuals.window_rounding = egui::Rounding::same(8.0);
        visuals.panel_fill = BG_DARK;
        visuals.window_fill = BG_CARD;
        visuals.faint_bg_color = BG_ELEVATED;
        visuals.extreme_bg_color = BG_ELEVATED;
        visuals.selection.bg_fill = ACCENT_BLUE.linear_multiply(0.4);
        visuals.selection.stroke = egui::Stroke::new(1.0, ACCENT_BLUE);

        let widgets = &mut visuals.widgets;
        for (state, fill, text) in [
            (&mut widgets.noninteractive, BG_CARD, TEXT_SECONDARY),
            (&mut widgets.inactive, BG_ELEVATED, TEXT_PRIMARY),
            (&mut widgets.hovered, BG_HOVER, egui::Color32::WHITE),
            (&mut widgets.active, ACCENT_BLUE, egui::Color32::WHITE),
        ] {
            state.rounding = egui::Rounding::same(6.0);
            state.bg_fill = fill;
            state.weak_bg_fill = fill;
            state.fg_stroke = egui::Stroke::new(1.0, text);
        }

        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        ctx.set_style(style);
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_theme(ctx);
        self.app.tick();
        if self.app.should_quit {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        // ── Top Bar ──
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add_space(8.0);
                ui.label(egui::RichText::new("Stock Price Forecasting Dashboard")
                    .size(18.0)
                    .strong()
                    .color(ACCENT_BLUE));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_space(8.0);
                    ui.label(egui::RichText::new(format!("Data: {}", self.app.provider_name()))
                        .size(11.0)
                        .color(TEXT_SECONDARY));
                });
            });
            ui.add_space(4.0);
        });

        // ── Inputs ──
        egui::SidePanel::left("inputs")
            .resizable(false)
            .exact_width(240.0)
            .show(ctx, |ui| self.render_inputs(ui));

        // ── Main Content ──
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| self.render_page(ui));
        });

        if self.app.is_loading() {
            ctx.request_repaint();
        }
    }
}

impl GuiApp {
    fn render_inputs(&mut self, ui: &mut egui::Ui) {
        ui.add_space(12.0);
        let loading = self.app.is_loading();
        let mut submitted = false;

        for (label, value, hint) in [
            ("Enter Stock Ticker", &mut self.app.ticker, "e.g. AAPL"),
            ("Start Date", &mut self.app.start, "YYYY-MM-DD"),
            ("End Date", &mut self.app.end, "YYYY-MM-DD"),
        ] {
            ui.label(egui::RichText::new(label).size(12.0).color(TEXT_SECONDARY));
            let response = ui.add(
                egui::TextEdit::singleline(value)
                    .desired_width(f32::INFINITY)
                    .hint_text(hint),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                submitted = true;
            }
            ui.add_space(6.0);
        }

        ui.checkbox(&mut self.app.auto_adjust, "Adjust for splits and dividends");
        ui.add_space(10.0);

        let width = ui.available_width();
        let btn = ui.add_enabled(
            !loading,
            egui::Button::new(
                egui::RichText::new(if loading { "Loading..." } else { "Fetch Data" })
                    .size(14.0)
                    .strong()
                    .color(egui::Color32::WHITE),
            )
            .fill(if loading { BG_ELEVATED } else { ACCENT_BLUE })
            .rounding(egui::Rounding::same(8.0))
            .min_size(egui::vec2(width, 36.0)),
        );

        if (btn.clicked() || submitted) && !loading {
            self.app.trigger_fetch();
        }
    }

    fn render_page(&self, ui: &mut egui::Ui) {
        if self.app.is_loading() {
            ui.add_space(24.0);
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(egui::RichText::new("Fetching data and training the model...")
                    .size(14.0)
                    .color(TEXT_PRIMARY));
            });
        } else if self.app.state == AppState::Dashboard {
            if let Some(run) = &self.app.run {
                render_run(ui, run);
            }
        } else if self.app.current_error().is_none() {
            ui.add_space(24.0);
            ui.label(egui::RichText::new(
                "Enter a ticker and a date range in the sidebar, then click Fetch Data.")
                .size(13.0)
                .color(TEXT_SECONDARY));
        }

        if let Some(err) = self.app.current_error() {
            ui.add_space(12.0);
            egui::Frame::none()
                .fill(egui::Color32::from_rgba_premultiplied(239, 68, 68, 25))
                .rounding(egui::Rounding::same(6.0))
                .inner_margin(egui::Margin::same(8.0))
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(err).color(ACCENT_RED).size(13.0));
                });
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Dashboard Sections
// ──────────────────────────────────────────────────────────────────────────────

fn render_run(ui: &mut egui::Ui, run: &DashboardRun) {
    let Some(data) = &run.data else {
        return;
    };
    let ticker = run.request.display_ticker();

    card(ui, |ui| {
        section_header(ui, &format!("Historical Data for {}", ticker));
        render_tail_grid(ui, data);
    });

    card(ui, |ui| {
        section_header(ui, "Historical Closing Prices");
        Plot::new("close_chart")
            .height(PLOT_HEIGHT)
            .x_axis_formatter(|mark, _range| axis_date_label(mark.value))
            .label_formatter(|_, value| format!("{}\n${:.2}", axis_date_label(value.x), value.y))
            .show(ui, |plot_ui| {
                plot_ui.line(
                    Line::new(close_points(data))
                        .name("Close")
                        .color(ACCENT_CYAN)
                        .width(1.6),
                );
            });
    });

    // The heading stays up when the fit fails, with the error below it.
    card(ui, |ui| {
        section_header(ui, "Training ARIMA Model");
        let Some(model) = &run.model else {
            return;
        };
        stat_row(ui, "Order", &model.order.to_string(), ACCENT_CYAN);
        stat_row(ui, "Observations", &model.nobs.to_string(), TEXT_PRIMARY);
        stat_row(ui, "AIC", &format!("{:.3}", model.aic), TEXT_PRIMARY);
        ui.add_space(8.0);
        ui.label(egui::RichText::new("ARIMA Model Summary:")
            .size(12.0)
            .strong()
            .color(TEXT_PRIMARY));
        ui.label(egui::RichText::new(model.to_string())
            .size(11.0)
            .color(TEXT_PRIMARY)
            .family(egui::FontFamily::Monospace));
    });

    if let Some(forecast) = &run.forecast {
        card(ui, |ui| {
            section_header(ui, "Stock Price Forecast");
            render_forecast_plot(ui, &ticker, data, forecast);
        });
    }
}

fn render_tail_grid(ui: &mut egui::Ui, data: &StockData) {
    if data.is_empty() {
        ui.label(egui::RichText::new("No rows returned for this range.")
            .size(12.0)
            .color(TEXT_SECONDARY));
        return;
    }

    egui::Grid::new("tail_table")
        .striped(true)
        .min_col_width(80.0)
        .show(ui, |ui| {
            for head in ["Date", "Open", "High", "Low", "Close", "Volume"] {
                ui.label(egui::RichText::new(head).size(11.0).strong().color(TEXT_SECONDARY));
            }
            ui.end_row();

            for c in data.tail(TAIL_ROWS) {
                ui.label(c.date.format(DATE_FORMAT).to_string());
                for v in [c.open, c.high, c.low, c.close] {
                    ui.label(format!("{:.2}", v));
                }
                ui.label(format!("{:.0}", c.volume));
                ui.end_row();
            }
        });
}

fn render_forecast_plot(ui: &mut egui::Ui, ticker: &str, data: &StockData, forecast: &ForecastData) {
    ui.label(egui::RichText::new(format!("{} Price Forecast", ticker))
        .size(12.0)
        .color(TEXT_SECONDARY));

    Plot::new("forecast_chart")
        .height(PLOT_HEIGHT)
        .legend(Legend::default().position(egui_plot::Corner::LeftTop))
        .x_axis_label("Date")
        .y_axis_label("Price")
        .x_axis_formatter(|mark, _range| axis_date_label(mark.value))
        .label_formatter(|name, value| {
            format!("{}\nDate: {}\nPrice: ${:.2}", name, axis_date_label(value.x), value.y)
        })
        .show(ui, |plot_ui| {
            let mut band: Vec<[f64; 2]> = forecast
                .points
                .iter()
                .map(|p| [date_x(p.date), p.upper])
                .collect();
            band.extend(forecast.points.iter().rev().map(|p| [date_x(p.date), p.lower]));
            plot_ui.polygon(
                Polygon::new(PlotPoints::new(band))
                    .name(format!("{:.0}% interval", forecast.confidence_level * 100.0))
                    .fill_color(egui::Color32::from_rgba_premultiplied(250, 204, 21, 24))
                    .stroke(egui::Stroke::NONE),
            );

            plot_ui.line(
                Line::new(close_points(data))
                    .name("Actual Prices")
                    .color(ACCENT_CYAN)
                    .width(1.6),
            );

            let predicted: PlotPoints = forecast
                .points
                .iter()
                .map(|p| [date_x(p.date), p.value])
                .collect();
            plot_ui.line(
                Line::new(predicted)
                    .name("Forecasted Prices")
                    .color(ACCENT_YELLOW)
                    .style(LineStyle::Dashed { length: 8.0 })
                    .width(2.0),
            );
        });
}

// ──────────────────────────────────────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────────────────────────────────────

fn date_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

fn axis_date_label(x: f64) -> String {
    if !x.is_finite() || x < i32::MIN as f64 || x > i32::MAX as f64 {
        return String::new();
    }
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn close_points(data: &StockData) -> PlotPoints {
    data.close_series()
        .into_iter()
        .map(|(date, close)| [date_x(date), close])
        .collect()
}

fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::none()
        .fill(BG_CARD)
        .rounding(egui::Rounding::same(8.0))
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            add_contents(ui);
        });
    ui.add_space(8.0);
}

fn section_header(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text)
        .size(15.0)
        .strong()
        .color(TEXT_PRIMARY));
    ui.add_space(4.0);
}

fn stat_row(ui: &mut egui::Ui, label: &str, value: &str, color: egui::Color32) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label).size(11.0).color(TEXT_SECONDARY));
        ui.label(egui::RichText::new(value).size(12.0).strong().color(color));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_labels_round_trip_dates() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
        assert_eq!(axis_date_label(date_x(date)), "2023-12-29");
        assert_eq!(axis_date_label(date_x(date) + 0.4), "2023-12-29");
    }

    #[test]
    fn axis_labels_ignore_out_of_range_values() {
        assert_eq!(axis_date_label(f64::NAN), "");
        assert_eq!(axis_date_label(1e12), "");
    }
}
