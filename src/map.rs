use gtk::prelude::*;
use gtk::{glib, Label, Orientation, Popover};
use libshumate::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::MapSettings;
use crate::severity::{heat_colors, HEAT_FILL_OPACITY};

const EARTH_RADIUS_M: f64 = 6_371_008.8;
const HEAT_SEGMENTS: usize = 64;

/// Hosts the single live map of the dashboard.
///
/// Drawing a new map always tears down the previous one first, so callers
/// never have to remember to remove it.
pub struct MapCanvas {
    host: gtk::Box,
    settings: MapSettings,
    instances: Cell<usize>,
    live: RefCell<Option<LiveMap>>,
}

struct LiveMap {
    host: gtk::Box,
    widget: libshumate::SimpleMap,
    view: libshumate::Map,
    viewport: libshumate::Viewport,
    markers: libshumate::MarkerLayer,
    popovers: Vec<Popover>,
    heat: Vec<libshumate::PathLayer>,
}

impl Drop for LiveMap {
    fn drop(&mut self) {
        for layer in self.heat.drain(..) {
            self.view.remove_layer(&layer);
        }
        for popover in self.popovers.drain(..) {
            popover.unparent();
        }
        self.markers.remove_all();
        self.host.remove(&self.widget);
    }
}

impl MapCanvas {
    pub fn new(settings: MapSettings) -> Self {
        let host = gtk::Box::builder()
            .orientation(Orientation::Vertical)
            .vexpand(true)
            .hexpand(true)
            .build();

        MapCanvas {
            host,
            settings,
            instances: Cell::new(0),
            live: RefCell::new(None),
        }
    }

    pub fn widget(&self) -> &gtk::Box {
        &self.host
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Releases the live map, if any.
    pub fn clear(&self) {
        if self.live.borrow_mut().take().is_some() {
            log::debug!("Released live map");
        }
    }

    pub fn draw_map(&self, latitude: f64, longitude: f64, zoom: f64) {
        self.clear();

        let instance = self.instances.get();
        self.instances.set(instance + 1);

        let tile_url = resolve_tile_url(&self.settings.tile_url, &self.settings.subdomains, instance);
        let map_source = libshumate::RasterRenderer::from_url(&tile_url);
        map_source.set_license(&self.settings.attribution);

        let widget = libshumate::SimpleMap::new();
        widget.set_map_source(Some(&map_source));
        widget.set_vexpand(true);
        widget.set_hexpand(true);

        let Some(view) = widget.map() else {
            log::error!("Map widget has no map view");
            return;
        };
        let Some(viewport) = view.viewport() else {
            log::error!("Map view has no viewport");
            return;
        };

        let markers = libshumate::MarkerLayer::new(&viewport);
        view.add_layer(&markers);

        viewport.set_min_zoom_level(1);
        viewport.set_max_zoom_level(18);
        viewport.set_zoom_level(zoom);
        view.center_on(latitude, longitude);

        self.host.append(&widget);
        log::info!("Drew map at ({}, {}) zoom {} from {}", latitude, longitude, zoom, tile_url);

        *self.live.borrow_mut() = Some(LiveMap {
            host: self.host.clone(),
            widget,
            view,
            viewport,
            markers,
            popovers: Vec::new(),
            heat: Vec::new(),
        });
    }

    /// Adds a pin with a popup carrying `label`, optionally shown right away.
    pub fn draw_marker(&self, latitude: f64, longitude: f64, label: &str, open_popup: bool) {
        let mut live = self.live.borrow_mut();
        let Some(live) = live.as_mut() else {
            log::warn!("No live map for marker {}", label);
            return;
        };

        let marker_button = gtk::Button::builder()
            .icon_name("mark-location-symbolic")
            .tooltip_text(label)
            .build();
        marker_button.add_css_class("map-marker");

        let popover = Popover::builder().autohide(false).build();
        popover.add_css_class("map-popover");

        let popover_label = Label::builder()
            .margin_top(6)
            .margin_bottom(6)
            .margin_start(8)
            .margin_end(8)
            .build();
        popover_label.set_markup(&format!("<b>{}</b>", glib::markup_escape_text(label)));
        popover.set_child(Some(&popover_label));
        popover.set_parent(&marker_button);

        let popover_clone = popover.clone();
        marker_button.connect_clicked(move |_| {
            if popover_clone.is_visible() {
                popover_clone.popdown();
            } else {
                popover_clone.popup();
            }
        });

        if open_popup {
            // a popover can only pop up once its parent is on screen
            let shown = Rc::new(Cell::new(false));
            let popover_clone = popover.clone();
            marker_button.connect_map(move |_| {
                if !shown.replace(true) {
                    popover_clone.popup();
                }
            });
        }

        let marker = libshumate::Marker::new();
        marker.set_child(Some(&marker_button));
        marker.set_location(latitude, longitude);
        live.markers.add_marker(&marker);
        live.popovers.push(popover);
    }

    /// Overlays a translucent circle colored by the severity of `confirmed`.
    pub fn draw_heat(&self, latitude: f64, longitude: f64, confirmed: u64, radius: f64) {
        let mut live = self.live.borrow_mut();
        let Some(live) = live.as_mut() else {
            log::warn!("No live map for heat circle");
            return;
        };

        let colors = heat_colors(confirmed);
        let (stroke, fill) = match (gdk::RGBA::parse(colors.stroke), gdk::RGBA::parse(colors.fill)) {
            (Ok(stroke), Ok(fill)) => (stroke, fill.with_alpha(HEAT_FILL_OPACITY)),
            _ => {
                log::error!("Unparseable heat colors {:?}", colors);
                return;
            }
        };

        let layer = libshumate::PathLayer::new(&live.viewport);
        layer.set_closed(true);
        layer.set_fill(true);
        layer.set_fill_color(Some(&fill));
        layer.set_stroke_color(Some(&stroke));
        layer.set_stroke_width(3.0);

        for (lat, lon) in circle_outline(latitude, longitude, radius, HEAT_SEGMENTS) {
            layer.add_node(&libshumate::Coordinate::new_full(lat, lon));
        }

        live.view.add_layer(&layer);
        live.heat.push(layer);
    }
}

impl Drop for MapCanvas {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Fills the `{s}` placeholder with a subdomain, rotating per map instance.
pub fn resolve_tile_url(template: &str, subdomains: &[String], instance: usize) -> String {
    if subdomains.is_empty() {
        return template.replace("{s}.", "");
    }
    template.replace("{s}", &subdomains[instance % subdomains.len()])
}

/// Points of a geodesic circle around a center, as (latitude, longitude).
pub fn circle_outline(latitude: f64, longitude: f64, radius_m: f64, segments: usize) -> Vec<(f64, f64)> {
    let angular = radius_m / EARTH_RADIUS_M;
    let lat1 = latitude.to_radians();
    let lon1 = longitude.to_radians();

    (0..segments)
        .map(|i| {
            let bearing = std::f64::consts::TAU * i as f64 / segments as f64;
            let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
            let lon2 = lon1
                + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());
            (lat2.to_degrees(), lon2.to_degrees())
        })
        .collect()
}
