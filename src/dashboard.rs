//! Dashboard state and the transitions that drive it.
//!
//! Widgets never mutate this state directly: every request result and user
//! action becomes an [`Event`], [`reduce`] produces the next state together
//! with the [`Effect`]s the view has to carry out (map redraws, error modals).

use crate::data::{
    format_last_update, ingest_countries, Country, CountryDetail, RawCountry, RequestKind, TableRow,
    WorldTotal, NO_TIMESTAMP,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub table: Vec<TableRow>,
    pub original_table: Vec<TableRow>,
    pub countries: Vec<Country>,
    pub original_countries: Vec<Country>,
    pub search_text: String,
    pub last_update: String,
    pub original_last_update: String,
    pub current_location: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        DashboardState {
            table: Vec::new(),
            original_table: Vec::new(),
            countries: Vec::new(),
            original_countries: Vec::new(),
            search_text: String::new(),
            last_update: NO_TIMESTAMP.to_string(),
            original_last_update: NO_TIMESTAMP.to_string(),
            current_location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WorldTotalLoaded(Vec<WorldTotal>),
    CountriesLoaded(Vec<RawCountry>),
    CountryDetailLoaded(Vec<CountryDetail>),
    RequestFailed(RequestKind),
    FilterChanged(String),
    SearchReset,
}

/// Where to center the map after a country was picked
#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub confirmed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replace the map with the world view and one marker per country.
    SeedWorldMap(Vec<Country>),
    /// Replace the map with a single country, its open popup and heat circle.
    FocusCountry(Focus),
    Notify(RequestKind),
}

pub fn reduce(mut state: DashboardState, event: Event) -> (DashboardState, Vec<Effect>) {
    let effects = match event {
        Event::WorldTotalLoaded(totals) => {
            let rows: Vec<TableRow> = totals.iter().map(TableRow::from).collect();
            state.last_update = format_last_update(totals.first().and_then(|t| t.last_update));
            state.original_last_update = state.last_update.clone();
            state.original_table = rows.clone();
            state.table = rows;
            Vec::new()
        }
        Event::CountriesLoaded(raw) => {
            let countries = ingest_countries(raw);
            state.original_countries = countries.clone();
            state.countries = countries.clone();
            vec![Effect::SeedWorldMap(countries)]
        }
        Event::CountryDetailLoaded(details) => match details.first() {
            Some(first) => {
                let focus = Focus {
                    name: first.country.clone(),
                    latitude: first.latitude,
                    longitude: first.longitude,
                    confirmed: first.confirmed,
                };
                state.last_update = format_last_update(first.last_update);
                state.current_location = Some(first.country.clone());
                state.table = details.iter().map(TableRow::from).collect();
                vec![Effect::FocusCountry(focus)]
            }
            None => vec![Effect::Notify(RequestKind::CountryDetail)],
        },
        Event::RequestFailed(kind) => vec![Effect::Notify(kind)],
        Event::FilterChanged(text) => {
            state.countries = filter_countries(&state.countries, &text);
            state.search_text = text;
            Vec::new()
        }
        Event::SearchReset => {
            state.search_text.clear();
            state.table = state.original_table.clone();
            state.countries = state.original_countries.clone();
            state.last_update = state.original_last_update.clone();
            state.current_location = None;
            vec![Effect::SeedWorldMap(state.countries.clone())]
        }
    };

    (state, effects)
}

/// Case-insensitive substring match on the country name, preserving order.
pub fn filter_countries(countries: &[Country], text: &str) -> Vec<Country> {
    let needle = text.to_lowercase();
    countries
        .iter()
        .filter(|country| country.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// The detail endpoint is queried with lower-case codes.
pub fn detail_code(code: &str) -> String {
    code.to_lowercase()
}
