use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use eframe::egui;
use tokio::runtime::Runtime;
use tracing::{error, info};
use wave2notes_audio::{create_backend, AudioSource, BackendKind, BackendPorts, CpalMediaFactory};
use wave2notes_domain::TranscriptionResult;
use wave2notes_player::{Playable, PlaybackSession, PlaybackState};
use wave2notes_roll::{Palette, PaletteMode, PianoRollView};

use crate::settings::ViewerSettings;

pub struct ViewerApp {
    view: PianoRollView,
    settings: ViewerSettings,
    notice: Rc<RefCell<Option<String>>>,
    backend: BackendKind,
}

impl ViewerApp {
    pub fn new(
        ctx: &egui::Context,
        runtime: Arc<Runtime>,
        settings: ViewerSettings,
        result: TranscriptionResult,
        backend: BackendKind,
        audio: Option<AudioSource>,
    ) -> Self {
        apply_visuals(ctx, settings.palette);
        let audio_backend = create_backend(backend, &desktop_ports(&settings));
        let mut session = PlaybackSession::from_result(audio_backend, &result, settings.window);

        let notice = Rc::new(RefCell::new(None));
        let sink = notice.clone();
        let controller = session.controller_mut();
        controller.on_capability_warning(move |warning| {
            *sink.borrow_mut() = Some(warning.message());
        });
        controller.set_volume(settings.volume);
        match audio {
            Some(source) => {
                info!(%source, %backend, "loading audio");
                runtime.spawn(session.initialize_audio(source));
            }
            None => info!("no audio rendering; playing visuals only"),
        }

        let mut view = PianoRollView::new(session)
            .with_range(settings.range)
            .with_tuning(settings.tuning);
        view.set_palette(Palette::for_mode(settings.palette));
        Self {
            view,
            settings,
            notice,
            backend,
        }
    }

    fn persist(&self) {
        if let Err(err) = self.settings.save() {
            error!(?err, "failed to save settings");
        }
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        let state = self.view.session().controller().state();
        let cursor = self.view.session().frame().cursor;
        ui.horizontal(|ui| {
            let label = if state == PlaybackState::Playing {
                "Pause"
            } else {
                "Play"
            };
            if ui.button(label).clicked() {
                toggle(&mut self.view, state);
            }
            if ui.button("Reset").clicked() {
                self.view.reset();
            }

            let mut position = cursor.current_time;
            let slider = egui::Slider::new(&mut position, 0.0..=cursor.total_duration.max(0.01))
                .show_value(false);
            if ui.add(slider).changed() {
                self.view.seek(position);
            }
            ui.label(format!(
                "{} / {}",
                format_time(cursor.current_time),
                format_time(cursor.total_duration)
            ));

            ui.separator();
            let mut volume = self.settings.volume;
            let response = ui.add(egui::Slider::new(&mut volume, 0.0..=1.0).text("Volume"));
            if response.changed() {
                self.settings.volume = volume;
                self.view.session_mut().controller_mut().set_volume(volume);
            }
            if response.drag_released() || (response.changed() && !response.dragged()) {
                self.persist();
            }

            let next = match self.settings.palette {
                PaletteMode::Dark => PaletteMode::Light,
                PaletteMode::Light => PaletteMode::Dark,
            };
            if ui.button(format!("{next:?} theme")).clicked() {
                self.settings.palette = next;
                apply_visuals(ui.ctx(), next);
                self.view.set_palette(Palette::for_mode(next));
                self.persist();
            }
            ui.weak(format!("audio: {}", self.backend));
        });
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|input| input.key_pressed(egui::Key::Space)) {
            let state = self.view.session().controller().state();
            toggle(&mut self.view, state);
        }

        egui::TopBottomPanel::top("transport").show(ctx, |ui| {
            self.transport(ui);
            let message = self.notice.borrow().clone();
            if let Some(message) = message {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::from_rgb(0xFF, 0x8C, 0x42), message);
                    if ui.small_button("Dismiss").clicked() {
                        *self.notice.borrow_mut() = None;
                    }
                });
            }
        });
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.view.show(ui);
            });
    }
}

fn toggle(view: &mut dyn Playable, state: PlaybackState) {
    if state == PlaybackState::Playing {
        view.stop();
    } else {
        view.start();
    }
}

/// Ports the desktop host can serve. Media elements only exist in a browser host.
fn desktop_ports(settings: &ViewerSettings) -> BackendPorts {
    let output = match &settings.output_device {
        Some(name) => CpalMediaFactory::new().with_device(name.clone()),
        None => CpalMediaFactory::new(),
    };
    BackendPorts::default().with_native(Arc::new(output))
}

fn apply_visuals(ctx: &egui::Context, mode: PaletteMode) {
    ctx.set_visuals(match mode {
        PaletteMode::Dark => egui::Visuals::dark(),
        PaletteMode::Light => egui::Visuals::light(),
    });
}

fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_registers_a_native_port() {
        let ports = desktop_ports(&ViewerSettings::default());
        assert!(ports.native.is_some());
        assert_eq!(
            create_backend(BackendKind::Native, &ports).kind(),
            BackendKind::Native
        );
        assert_eq!(
            create_backend(BackendKind::Null, &ports).kind(),
            BackendKind::Null
        );
    }

    #[test]
    fn time_labels() {
        assert_eq!(format_time(0.0), "0:00.0");
        assert_eq!(format_time(75.3), "1:15.3");
        assert_eq!(format_time(-3.0), "0:00.0");
    }
}
