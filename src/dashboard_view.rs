use gtk::prelude::*;
use gtk::{glib, Align, Label, ListBox, Orientation, ScrolledWindow, SearchEntry};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::config::{MapSettings, Settings, TimingSettings};
use crate::dashboard::{detail_code, reduce, DashboardState, Effect, Event, Focus};
use crate::data::{Country, RequestKind, TableRow};
use crate::gateway::{Gateway, GatewayError};
use crate::lease::{Lease, Outcome};
use crate::map::MapCanvas;
use crate::notifier::Notifier;

/// Owns the dashboard state and keeps widgets and map in sync with it.
pub struct Dashboard {
    state: RefCell<DashboardState>,
    gateway: Gateway,
    timing: TimingSettings,
    map: MapCanvas,
    notifier: Notifier,
    leases: RefCell<HashMap<RequestKind, Lease>>,
    widgets: Widgets,
}

struct Widgets {
    search_entry: SearchEntry,
    country_list: ListBox,
    confirmed: Label,
    critical: Label,
    deaths: Label,
    recovered: Label,
    last_update: Label,
    location: Label,
}

pub fn create_dashboard_view(
    settings: Settings,
    notifier: Notifier,
) -> Result<(gtk::Box, Rc<Dashboard>), GatewayError> {
    let gateway = Gateway::new(&settings.api)?;

    let container = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .build();

    let scrolled_window = ScrolledWindow::builder()
        .vexpand(false)
        .hexpand(true)
        .build();

    let sidebar = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(12)
        .margin_top(12)
        .margin_bottom(12)
        .margin_start(12)
        .margin_end(12)
        .build();

    let location = Label::builder()
        .label("World")
        .xalign(0.0)
        .build();
    location.add_css_class("title-2");

    let last_update = Label::builder()
        .label("Last update: loading...")
        .xalign(0.0)
        .build();
    last_update.add_css_class("dim-label");
    last_update.add_css_class("caption");

    let (table, confirmed, critical, deaths, recovered) = build_stats_table();

    let search_entry = SearchEntry::builder()
        .placeholder_text("Search countries...")
        .build();

    let country_list = ListBox::builder()
        .selection_mode(gtk::SelectionMode::None)
        .activate_on_single_click(true)
        .build();
    country_list.add_css_class("boxed-list");

    sidebar.append(&location);
    sidebar.append(&last_update);
    sidebar.append(&table);
    sidebar.append(&search_entry);
    sidebar.append(&country_list);
    scrolled_window.set_child(Some(&sidebar));

    let map = MapCanvas::new(settings.map);

    let dashboard = Rc::new(Dashboard {
        state: RefCell::new(DashboardState::default()),
        gateway,
        timing: settings.timing,
        map,
        notifier,
        leases: RefCell::new(HashMap::new()),
        widgets: Widgets {
            search_entry: search_entry.clone(),
            country_list: country_list.clone(),
            confirmed,
            critical,
            deaths,
            recovered,
            last_update,
            location,
        },
    });

    let weak = Rc::downgrade(&dashboard);
    search_entry.connect_search_changed(move |entry| {
        if let Some(dashboard) = weak.upgrade() {
            dashboard.apply_filter(&entry.text());
        }
    });

    let weak = Rc::downgrade(&dashboard);
    country_list.connect_row_activated(move |_, row| {
        let Some(dashboard) = weak.upgrade() else {
            return;
        };
        let code = usize::try_from(row.index())
            .ok()
            .and_then(|index| dashboard.state.borrow().countries.get(index).map(|c| c.code.clone()));
        if let Some(code) = code {
            dashboard.country_picked(&code);
        }
    });

    let paned = gtk::Paned::builder()
        .orientation(Orientation::Vertical)
        .wide_handle(true)
        .build();

    paned.set_start_child(Some(&scrolled_window));
    paned.set_resize_start_child(false);
    paned.set_shrink_start_child(false);

    paned.set_end_child(Some(dashboard.map.widget()));
    paned.set_resize_end_child(true);
    paned.set_shrink_end_child(false);

    paned.set_position(260);

    // Side by side on wide windows, stacked on tall ones
    let paned_weak = paned.downgrade();
    paned.add_tick_callback(move |_widget, _clock| {
        if let Some(paned) = paned_weak.upgrade() {
            let width = paned.width();
            let height = paned.height();

            if width > 0 && height > 0 {
                let should_be_horizontal = width > height;
                let is_horizontal = paned.orientation() == Orientation::Horizontal;

                if should_be_horizontal != is_horizontal {
                    if should_be_horizontal {
                        paned.set_orientation(Orientation::Horizontal);
                        paned.set_position(340);
                    } else {
                        paned.set_orientation(Orientation::Vertical);
                        paned.set_position(260);
                    }
                }
            }
        }
        glib::ControlFlow::Continue
    });

    container.append(&paned);

    let map_settings = dashboard.map.settings().clone();
    dashboard.map.draw_map(
        map_settings.default_latitude,
        map_settings.default_longitude,
        map_settings.default_zoom,
    );

    Ok((container, dashboard))
}

fn build_stats_table() -> (gtk::Grid, Label, Label, Label, Label) {
    let grid = gtk::Grid::builder()
        .column_spacing(18)
        .row_spacing(4)
        .column_homogeneous(true)
        .build();
    grid.add_css_class("stats-table");

    let confirmed = stats_value();
    let critical = stats_value();
    let deaths = stats_value();
    let recovered = stats_value();

    let columns = [
        ("Confirmed", &confirmed),
        ("Critical", &critical),
        ("Deaths", &deaths),
        ("Recovered", &recovered),
    ];
    for (column, (title, value)) in columns.iter().enumerate() {
        let header = Label::builder()
            .label(*title)
            .halign(Align::Start)
            .build();
        header.add_css_class("stats-header");

        grid.attach(&header, column as i32, 0, 1, 1);
        grid.attach(*value, column as i32, 1, 1, 1);
    }

    (grid, confirmed, critical, deaths, recovered)
}

fn stats_value() -> Label {
    let value = Label::builder()
        .label("-")
        .halign(Align::Start)
        .selectable(true)
        .build();
    value.add_css_class("stats-value");
    value.add_css_class("numeric");
    value
}

impl Dashboard {
    /// World totals first, then the country directory once the upstream
    /// request spacing has passed.
    pub fn start(self: &Rc<Self>) {
        self.request_world_total();

        let weak = Rc::downgrade(self);
        let spacing = self.timing.request_spacing();
        glib::spawn_future_local(async move {
            glib::timeout_future(spacing).await;
            if let Some(dashboard) = weak.upgrade() {
                dashboard.request_countries();
            }
        });
    }

    fn request_world_total(self: &Rc<Self>) {
        let gateway = self.gateway.clone();
        self.issue(
            RequestKind::WorldTotal,
            async move { gateway.fetch_world_total().await },
            Event::WorldTotalLoaded,
        );
    }

    fn request_countries(self: &Rc<Self>) {
        let gateway = self.gateway.clone();
        self.issue(
            RequestKind::Countries,
            async move { gateway.fetch_countries().await },
            Event::CountriesLoaded,
        );
    }

    pub fn country_picked(self: &Rc<Self>, code: &str) {
        let code = detail_code(code);
        log::info!("Country picked: {}", code);

        let gateway = self.gateway.clone();
        self.issue(
            RequestKind::CountryDetail,
            async move { gateway.fetch_country_detail(&code).await },
            Event::CountryDetailLoaded,
        );
    }

    pub fn apply_filter(&self, text: &str) {
        if self.state.borrow().search_text == text {
            return;
        }
        self.dispatch(Event::FilterChanged(text.to_string()));
    }

    pub fn reset_search(&self) {
        self.dispatch(Event::SearchReset);
    }

    /// Releases every outstanding request and the live map.
    pub fn teardown(&self) {
        let released = self.leases.borrow_mut().drain().count();
        log::debug!("Released {} request leases", released);
        self.map.clear();
    }

    /// Runs `request` under a lease for `kind`; a newer request of the same
    /// kind releases the older one. A successful request's lease is
    /// forgotten once its linger has passed.
    fn issue<F, T>(self: &Rc<Self>, kind: RequestKind, request: F, on_success: fn(T) -> Event)
    where
        F: Future<Output = Result<T, GatewayError>> + 'static,
        T: 'static,
    {
        let (lease, leased) = Lease::acquire(kind, self.timing.lease_for(kind), request);
        let linger = lease.linger();
        self.leases.borrow_mut().insert(kind, lease);
        log::debug!("Issued {:?} request", kind);

        let weak: Weak<Self> = Rc::downgrade(self);
        glib::spawn_future_local(async move {
            let event = match leased.await {
                Outcome::Completed(Ok(value)) => {
                    let weak = weak.clone();
                    glib::spawn_future_local(async move {
                        glib::timeout_future(linger).await;
                        if let Some(dashboard) = weak.upgrade() {
                            dashboard.forget_lease(kind);
                        }
                    });
                    Some(on_success(value))
                }
                Outcome::Completed(Err(e)) => {
                    log::error!("{:?} request failed: {}", kind, e);
                    Some(Event::RequestFailed(kind))
                }
                Outcome::Released => None,
            };

            if let (Some(event), Some(dashboard)) = (event, weak.upgrade()) {
                dashboard.dispatch(event);
            }
        });
    }

    /// Drops a finished lease; a newer request of the same kind still in
    /// flight keeps its lease.
    fn forget_lease(&self, kind: RequestKind) {
        let mut leases = self.leases.borrow_mut();
        if leases.get(&kind).is_some_and(Lease::is_released) {
            leases.remove(&kind);
            log::debug!("Forgot finished {:?} lease", kind);
        }
    }

    fn dispatch(&self, event: Event) {
        let countries_changed = matches!(
            event,
            Event::CountriesLoaded(_) | Event::FilterChanged(_) | Event::SearchReset
        );

        let current = self.state.replace(DashboardState::default());
        let (next, effects) = reduce(current, event);
        *self.state.borrow_mut() = next;

        self.refresh_labels();
        if countries_changed {
            self.refresh_country_list();
        }

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::SeedWorldMap(countries) => self.seed_world_map(&countries),
            Effect::FocusCountry(focus) => self.focus_country(&focus),
            Effect::Notify(kind) => self.notifier.notify(kind),
        }
    }

    fn seed_world_map(&self, countries: &[Country]) {
        let settings: &MapSettings = self.map.settings();
        self.map.draw_map(
            settings.default_latitude,
            settings.default_longitude,
            settings.default_zoom,
        );
        for country in countries {
            self.map.draw_marker(country.latitude, country.longitude, &country.name, false);
        }
        log::info!("Seeded world map with {} markers", countries.len());
    }

    fn focus_country(&self, focus: &Focus) {
        let settings: &MapSettings = self.map.settings();
        self.map.draw_map(focus.latitude, focus.longitude, settings.focus_zoom);
        self.map.draw_marker(focus.latitude, focus.longitude, &focus.name, true);
        self.map.draw_heat(focus.latitude, focus.longitude, focus.confirmed, settings.heat_radius);
    }

    fn refresh_labels(&self) {
        let state = self.state.borrow();
        let widgets = &self.widgets;

        let row = state.table.first().copied();
        let cell = |value: Option<u64>| value.map(group_thousands).unwrap_or_else(|| "-".to_string());
        widgets.confirmed.set_label(&cell(row.map(|r: TableRow| r.confirmed)));
        widgets.critical.set_label(&cell(row.map(|r| r.critical)));
        widgets.deaths.set_label(&cell(row.map(|r| r.deaths)));
        widgets.recovered.set_label(&cell(row.map(|r| r.recovered)));

        widgets
            .last_update
            .set_label(&format!("Last update: {}", state.last_update));
        widgets
            .location
            .set_label(state.current_location.as_deref().unwrap_or("World"));

        let search_text = state.search_text.clone();
        drop(state);
        if widgets.search_entry.text() != search_text {
            widgets.search_entry.set_text(&search_text);
        }
    }

    fn refresh_country_list(&self) {
        let list = &self.widgets.country_list;
        while let Some(child) = list.first_child() {
            list.remove(&child);
        }

        let state = self.state.borrow();
        for country in state.countries.iter() {
            let label = Label::builder()
                .label(&country.name)
                .tooltip_text(country.alpha3.as_deref().unwrap_or(&country.code))
                .xalign(0.0)
                .margin_top(6)
                .margin_bottom(6)
                .margin_start(8)
                .margin_end(8)
                .build();
            list.append(&label);
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.leases.get_mut().clear();
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
