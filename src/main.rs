use anyhow::Context;
use gtk::prelude::*;
use gtk::{glib, Application, Label};
use libadwaita::{prelude::*, ApplicationWindow, ColorScheme, HeaderBar, StyleManager, ToolbarView};
use std::cell::RefCell;
use std::rc::Rc;

mod config;
mod dashboard;
mod dashboard_view;
mod data;
mod gateway;
mod lease;
mod map;
mod notifier;
mod severity;

use config::Settings;
use data::APP_ID;
use notifier::Notifier;

fn main() -> anyhow::Result<glib::ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // reqwest needs a tokio context on the UI thread
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let _guard = rt.enter();

    let settings = Settings::load().context("failed to load configuration")?;
    let pending_settings = Rc::new(RefCell::new(Some(settings)));

    let app = Application::builder()
        .application_id(APP_ID)
        .build();

    app.connect_activate(move |app| {
        match pending_settings.borrow_mut().take() {
            Some(settings) => build_ui(app, settings),
            None => {
                if let Some(window) = app.active_window() {
                    window.present();
                }
            }
        }
    });

    let exit_code = app.run();

    drop(_guard);
    drop(rt);

    Ok(exit_code)
}

fn build_ui(app: &Application, settings: Settings) {
    let style_manager = StyleManager::default();
    style_manager.set_color_scheme(ColorScheme::PreferDark);

    let window = ApplicationWindow::builder()
        .application(app)
        .title("Pandemic Atlas")
        .default_width(1000)
        .default_height(700)
        .build();

    let notifier = Notifier::new(&window);
    let (dashboard_view, dashboard) = match dashboard_view::create_dashboard_view(settings, notifier) {
        Ok(view) => view,
        Err(e) => {
            log::error!("Could not set up the data gateway: {}", e);
            app.quit();
            return;
        }
    };

    let header_bar = HeaderBar::builder()
        .build();

    let title_label = Label::builder()
        .label("Pandemic Atlas")
        .build();
    title_label.add_css_class("title-display");

    let reset_button = gtk::Button::builder()
        .icon_name("edit-clear-all-symbolic")
        .tooltip_text("Reset search and show the world")
        .build();

    let dashboard_for_reset = Rc::downgrade(&dashboard);
    reset_button.connect_clicked(move |_| {
        if let Some(dashboard) = dashboard_for_reset.upgrade() {
            dashboard.reset_search();
        }
    });

    header_bar.pack_start(&reset_button);
    header_bar.set_title_widget(Some(&title_label));

    let toolbar_view = ToolbarView::builder()
        .build();

    toolbar_view.add_top_bar(&header_bar);
    toolbar_view.set_content(Some(&dashboard_view));

    let css_provider = gtk::CssProvider::new();
    css_provider.load_from_data(
        ".map-marker {
            background-color: alpha(@accent_bg_color, 0.75);
            border-radius: 16px;
            padding: 2px;
            min-height: 0;
            min-width: 0;
            box-shadow: 0 2px 6px alpha(black, 0.4);
        }
        .map-marker:hover {
            background-color: alpha(@accent_bg_color, 0.95);
            box-shadow: 0 3px 8px alpha(black, 0.5);
        }
        .map-popover > contents {
            background-color: alpha(@card_bg_color, 0.95);
            border-radius: 12px;
            box-shadow: 0 4px 16px alpha(black, 0.6);
        }
        .title-display {
            font-size: 13px;
            font-weight: 600;
            padding: 4px 12px;
            background-color: alpha(@accent_bg_color, 0.15);
            border-radius: 6px;
        }
        .stats-table {
            padding: 8px;
            background-color: alpha(@card_bg_color, 0.5);
            border-radius: 8px;
            border: 1px solid alpha(@borders, 0.5);
        }
        .stats-header {
            font-size: 11px;
            font-weight: 600;
            color: alpha(@window_fg_color, 0.55);
        }
        .stats-value {
            font-size: 15px;
            font-weight: 700;
            color: @accent_color;
        }"
    );

    gtk::style_context_add_provider_for_display(
        &gtk::prelude::WidgetExt::display(&window),
        &css_provider,
        gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );

    // the handler owns the coordinator, so it lives exactly as long as the window
    let dashboard_for_close = dashboard.clone();
    window.connect_close_request(move |_| {
        dashboard_for_close.teardown();
        glib::Propagation::Proceed
    });

    window.set_content(Some(&toolbar_view));
    window.present();

    dashboard.start();
}
