use gtk::glib;
use gtk::prelude::*;
use libadwaita::prelude::*;

use crate::data::RequestKind;

const HEADING: &str = "Data unavailable";
const CLOSE_RESPONSE: &str = "close";

/// Surfaces failed requests as a modal dialog over the main window.
#[derive(Clone)]
pub struct Notifier {
    window: glib::WeakRef<gtk::Window>,
}

impl Notifier {
    pub fn new(window: &impl IsA<gtk::Window>) -> Self {
        Notifier {
            window: window.as_ref().downgrade(),
        }
    }

    pub fn notify(&self, kind: RequestKind) {
        let message = kind.user_message();
        log::warn!("{}", message);

        let Some(window) = self.window.upgrade() else {
            log::debug!("Window gone, dropping notification");
            return;
        };

        let dialog = libadwaita::MessageDialog::new(Some(&window), Some(HEADING), Some(message));
        dialog.add_response(CLOSE_RESPONSE, "_Close");
        dialog.set_default_response(Some(CLOSE_RESPONSE));
        dialog.set_close_response(CLOSE_RESPONSE);
        dialog.set_modal(true);
        dialog.present();
    }
}
