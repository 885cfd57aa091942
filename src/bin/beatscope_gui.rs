use std::collections::VecDeque;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;

use beatscope::audio::{
    AudioCapture, AudioSource, SourcePlayer, ToneSource, WavFileSource, list_input_devices,
};
use beatscope::mesh::{ColourVertex, GpuDevice, INDICES_PER_QUAD, VertexLayout};
use beatscope::registry::{RegistryListener, SourceHandle};
use beatscope::state::SavedState;
use beatscope::view::DragMode;
use beatscope::{
    ErrorFlags, LaneKind, ListenMode, PhaseProcessor, ScopeConfig, ScopeError, SourceRegistry,
    SourceShared, ViewController, WaveformDisplay,
};

#[derive(Parser, Debug)]
#[command(name = "beatscope_gui")]
#[command(about = "Beat-synchronised phase scope - GUI", long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local source WAV file (default: input device)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Use the test tone as the local source
    #[arg(long)]
    tone: bool,

    /// Remote source WAV file
    #[arg(short = 'r', long)]
    remote: Option<PathBuf>,

    /// Use a test tone in phase with the local tone as the remote source
    #[arg(long)]
    remote_tone: bool,

    #[arg(short, long)]
    bpm: Option<f64>,

    /// Restore local parameters from a saved state file
    #[arg(long)]
    load_state: Option<PathBuf>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    list_devices: bool,
}

enum GuiUpdate {
    Log(String),
}

struct GuiLogger {
    tx: Sender<GuiUpdate>,
    max_level: log::LevelFilter,
}

impl log::Log for GuiLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let msg = format!("[{}] {}", record.level(), record.args());
            let _ = self.tx.send(GuiUpdate::Log(msg));
        }
    }

    fn flush(&self) {}
}

/// Logs registry changes into the log panel.
struct RegistryLog;

impl RegistryListener for RegistryLog {
    fn source_added(&mut self, handle: SourceHandle, name: &str) {
        log::info!("Source {} added as {}", handle.index(), name);
    }

    fn source_removed(&mut self, handle: SourceHandle) {
        log::info!("Source {} removed", handle.index());
    }

    fn name_changed(&mut self, handle: SourceHandle, name: &str) {
        log::info!("Source {} renamed to {}", handle.index(), name);
    }
}

/// [`GpuDevice`] that keeps buffers in host memory and turns draw calls
/// into an egui mesh for the current lane rectangle.
struct EguiDevice {
    buffers: Vec<Option<Vec<u8>>>,
    target: egui::Rect,
    mesh: egui::Mesh,
}

impl EguiDevice {
    fn new() -> Self {
        Self {
            buffers: Vec::new(),
            target: egui::Rect::NOTHING,
            mesh: egui::Mesh::default(),
        }
    }

    fn allocate(&mut self, bytes: Vec<u8>) -> usize {
        self.buffers.push(Some(bytes));
        self.buffers.len() - 1
    }

    fn bytes(&self, id: usize) -> Option<&[u8]> {
        self.buffers.get(id)?.as_deref()
    }

    /// Start collecting draws for `rect`.
    fn begin(&mut self, rect: egui::Rect) {
        self.target = rect;
        self.mesh = egui::Mesh::default();
    }

    fn finish(&mut self) -> egui::Mesh {
        std::mem::take(&mut self.mesh)
    }

    fn to_screen(&self, vertex: &ColourVertex) -> (egui::Pos2, egui::Color32) {
        let [x, y, _] = vertex.position;
        let rect = self.target;
        let pos = egui::pos2(
            rect.left() + (x + 1.0) * 0.5 * rect.width(),
            rect.top() + (1.0 - y) * 0.5 * rect.height(),
        );
        let [r, g, b, a] = vertex.colour.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        (pos, egui::Color32::from_rgba_unmultiplied(r, g, b, a))
    }
}

impl GpuDevice for EguiDevice {
    type Buffer = usize;

    fn create_vertex_buffer(
        &mut self,
        _layout: &VertexLayout,
        size_bytes: usize,
    ) -> beatscope::Result<usize> {
        Ok(self.allocate(vec![0; size_bytes]))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> beatscope::Result<usize> {
        if indices.is_empty() {
            return Err(ScopeError::GpuBuffer("empty index buffer".into()));
        }
        Ok(self.allocate(bytemuck::cast_slice(indices).to_vec()))
    }

    fn upload(&mut self, buffer: &usize, byte_offset: usize, bytes: &[u8]) {
        if let Some(Some(storage)) = self.buffers.get_mut(*buffer)
            && let Some(dst) = storage.get_mut(byte_offset..byte_offset + bytes.len())
        {
            dst.copy_from_slice(bytes);
        }
    }

    fn orphan(&mut self, buffer: &usize) {
        if let Some(Some(storage)) = self.buffers.get_mut(*buffer) {
            storage.fill(0);
        }
    }

    fn draw_quads(
        &mut self,
        vertices: &usize,
        indices: &usize,
        base_vertex: usize,
        quads: Range<usize>,
    ) {
        let (Some(vertex_bytes), Some(index_bytes)) = (self.bytes(*vertices), self.bytes(*indices))
        else {
            return;
        };
        let vertex_size = std::mem::size_of::<ColourVertex>();
        let index_size = std::mem::size_of::<u32>();
        let first = quads.start * INDICES_PER_QUAD;
        let last = quads.end * INDICES_PER_QUAD;

        let mut points = Vec::with_capacity(last.saturating_sub(first));
        for i in first..last {
            let Some(raw) = index_bytes.get(i * index_size..(i + 1) * index_size) else {
                break;
            };
            let index = bytemuck::pod_read_unaligned::<u32>(raw) as usize + base_vertex;
            let Some(raw) = vertex_bytes.get(index * vertex_size..(index + 1) * vertex_size)
            else {
                break;
            };
            let vertex = bytemuck::pod_read_unaligned::<ColourVertex>(raw);
            points.push(self.to_screen(&vertex));
        }

        for (pos, colour) in points {
            let index = self.mesh.vertices.len() as u32;
            self.mesh.colored_vertex(pos, colour);
            self.mesh.indices.push(index);
        }
    }

    fn release(&mut self, buffer: usize) {
        if let Some(slot) = self.buffers.get_mut(buffer) {
            *slot = None;
        }
    }
}

/// Keeps a source's audio running until dropped.
enum Input {
    Device { _capture: AudioCapture },
    Player { _player: SourcePlayer },
}

fn start_source(
    shared: &Arc<SourceShared>,
    source: Option<Box<dyn AudioSource>>,
    config: &ScopeConfig,
    device: Option<&str>,
) -> anyhow::Result<Input> {
    let processor = PhaseProcessor::new(Arc::clone(shared));
    match source {
        Some(source) => Ok(Input::Player {
            _player: SourcePlayer::spawn(
                source,
                processor,
                config.capture.bpm,
                config.audio.buffer_size,
                true,
            ),
        }),
        None => Ok(Input::Device {
            _capture: AudioCapture::new(&config.audio, device, processor, config.capture.bpm)?,
        }),
    }
}

fn new_source(config: &ScopeConfig) -> Arc<SourceShared> {
    let shared = SourceShared::new(config.capture.max_sample_rate, config.capture.min_bpm);
    shared.set_listen_mode(config.capture.listen_mode);
    Arc::new(shared)
}

const MAX_LOG_LINES: usize = 1000;
const LANE_GAP: f32 = 6.0;
const LANE_BACKGROUND: egui::Color32 = egui::Color32::from_rgb(225, 225, 220);

struct ScopeApp {
    rx: Receiver<GuiUpdate>,
    log_lines: VecDeque<String>,
    registry: SourceRegistry,
    local: SourceHandle,
    remote: Option<SourceHandle>,
    name_edits: Vec<(SourceHandle, String)>,
    recent_errors: Vec<(SourceHandle, ErrorFlags)>,
    display: WaveformDisplay<usize>,
    device: EguiDevice,
    view: ViewController,
    drag_origin: Option<egui::Pos2>,
    lane_width: f32,
    force_refresh: bool,
    _inputs: Vec<Input>,
}

impl ScopeApp {
    fn new(
        _cc: &eframe::CreationContext<'_>,
        rx: Receiver<GuiUpdate>,
        registry: SourceRegistry,
        local: SourceHandle,
        remote: Option<SourceHandle>,
        config: &ScopeConfig,
        inputs: Vec<Input>,
    ) -> anyhow::Result<Self> {
        let name_edits = registry
            .iter()
            .map(|(handle, name, _)| (handle, name.to_string()))
            .collect();
        Ok(Self {
            rx,
            log_lines: VecDeque::new(),
            registry,
            local,
            remote,
            name_edits,
            recent_errors: Vec::new(),
            display: WaveformDisplay::new(&config.display)?,
            device: EguiDevice::new(),
            view: ViewController::with_zoom(
                config.display.zoom_speed,
                config.display.min_zoom,
                config.display.max_zoom,
            ),
            drag_origin: None,
            lane_width: 0.0,
            force_refresh: true,
            _inputs: inputs,
        })
    }

    fn drain_updates(&mut self) {
        while let Ok(update) = self.rx.try_recv() {
            match update {
                GuiUpdate::Log(msg) => {
                    self.log_lines.push_back(msg);
                    while self.log_lines.len() > MAX_LOG_LINES {
                        self.log_lines.pop_front();
                    }
                }
            }
        }
    }

    fn source(&self, handle: Option<SourceHandle>) -> Option<Arc<SourceShared>> {
        self.registry.get(handle?).ok()
    }

    fn collect_errors(&mut self) {
        let sources: Vec<_> = self
            .registry
            .iter()
            .map(|(handle, _, source)| (handle, source.take_errors()))
            .collect();
        for (handle, flags) in sources {
            if flags.is_empty() {
                continue;
            }
            log::warn!("Source {}: {}", handle.index(), flags);
            match self.recent_errors.iter_mut().find(|(h, _)| *h == handle) {
                Some((_, seen)) => *seen |= flags,
                None => self.recent_errors.push((handle, flags)),
            }
        }
    }

    fn draw_source_controls(&mut self, ui: &mut egui::Ui, handle: SourceHandle, title: &str) {
        let Some(source) = self.source(Some(handle)) else {
            return;
        };
        ui.label(
            egui::RichText::new(title)
                .color(egui::Color32::WHITE)
                .strong(),
        );

        if let Some((_, edit)) = self.name_edits.iter_mut().find(|(h, _)| *h == handle) {
            let response = ui.text_edit_singleline(edit);
            if response.lost_focus()
                && !edit.trim().is_empty()
                && let Err(e) = self.registry.rename(handle, edit.trim())
            {
                log::warn!("Rename failed: {}", e);
            }
        }

        let mut delay = source.delay();
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Delay:").color(egui::Color32::LIGHT_GRAY));
            if ui
                .add(
                    egui::Slider::new(
                        &mut delay,
                        -beatscope::constants::MAX_DELAY..=beatscope::constants::MAX_DELAY,
                    )
                    .suffix(" smp"),
                )
                .changed()
            {
                source.set_delay(delay);
            }
        });

        let mut invert = source.invert_phase();
        if ui.checkbox(&mut invert, "Invert phase").changed() {
            source.set_invert_phase(invert);
        }

        let mut mode = source.listen_mode();
        egui::ComboBox::from_id_salt(("listen_mode", handle.index()))
            .selected_text(mode.to_string())
            .show_ui(ui, |ui| {
                for option in [ListenMode::Left, ListenMode::Right, ListenMode::Sum] {
                    ui.selectable_value(&mut mode, option, option.to_string());
                }
            });
        if mode != source.listen_mode() {
            source.set_listen_mode(mode);
        }

        let beat = source.beat();
        ui.label(
            egui::RichText::new(format!(
                "Beat: {} samples @ {} Hz, {:.1} BPM",
                beat.capacity(),
                source.sample_rate(),
                source.bpm()
            ))
            .color(egui::Color32::LIGHT_GRAY)
            .small(),
        );

        if let Some((_, flags)) = self.recent_errors.iter().find(|(h, _)| *h == handle) {
            ui.label(
                egui::RichText::new(format!("Errors: {}", flags))
                    .color(egui::Color32::from_rgb(255, 100, 100)),
            );
        }

        if ui.small_button("Save state").clicked() {
            self.save_state(handle, &source);
        }
    }

    fn save_state(&self, handle: SourceHandle, source: &SourceShared) {
        let name = self.registry.name(handle).ok();
        let state = SavedState::capture(source, name);
        let path = PathBuf::from(format!("{}.json", name.unwrap_or("source")));
        match state.to_json() {
            Ok(json) => match std::fs::write(&path, json) {
                Ok(()) => log::info!("Saved state to {}", path.display()),
                Err(e) => log::warn!("Failed to write {}: {}", path.display(), e),
            },
            Err(e) => log::warn!("Failed to serialise state: {}", e),
        }
    }

    fn draw_remote_picker(&mut self, ui: &mut egui::Ui) {
        let others = self.registry.others(self.local);
        let selected = self
            .remote
            .and_then(|h| self.registry.name(h).ok())
            .unwrap_or("None")
            .to_string();
        let mut remote = self.remote;
        egui::ComboBox::from_label("Remote")
            .selected_text(selected)
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut remote, None, "None");
                for (handle, name) in &others {
                    ui.selectable_value(&mut remote, Some(*handle), name);
                }
            });
        if remote != self.remote {
            self.remote = remote;
            self.view.end_drag();
        }
    }

    fn handle_pointer(&mut self, ui: &egui::Ui, response: &egui::Response, rect: egui::Rect) {
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0
                && let Some(pos) = response.hover_pos()
            {
                let fraction = ((pos.x - rect.left()) / rect.width()) as f64;
                self.view.wheel(scroll.signum() as f64, fraction);
            }
        }

        if response.drag_started() {
            let modifiers = ui.input(|i| i.modifiers);
            self.view
                .begin_drag(DragMode::from_modifiers(modifiers.shift, modifiers.alt));
            self.drag_origin = response.interact_pointer_pos();
        }

        if response.dragged()
            && let (Some(origin), Some(pos)) = (self.drag_origin, response.interact_pointer_pos())
        {
            let target = match self.view.drag_mode() {
                Some(DragMode::LocalDelay) => self.source(Some(self.local)),
                Some(DragMode::RemoteDelay) => self.source(self.remote),
                _ => None,
            };
            self.view.drag_to(
                (pos.x - origin.x) as f64,
                rect.width() as f64,
                target.as_deref(),
            );
        }

        if response.drag_stopped() {
            self.view.end_drag();
            self.drag_origin = None;
        }

        if response.double_clicked() {
            self.view.reset();
        }
    }

    fn draw_lanes(&mut self, ui: &mut egui::Ui) {
        let Some(local) = self.source(Some(self.local)) else {
            ui.label("Local source is gone");
            return;
        };
        let remote = self.source(self.remote);

        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let rect = response.rect;
        self.handle_pointer(ui, &response, rect);

        if (rect.width() - self.lane_width).abs() > 0.5 {
            self.lane_width = rect.width();
            self.display.set_viewport_width(rect.width());
            self.force_refresh = true;
        }

        self.display.update(
            &local,
            self.remote.zip(remote.as_deref()),
            self.view.window(),
            std::mem::take(&mut self.force_refresh),
        );

        let lanes: Vec<LaneKind> = LaneKind::ALL
            .into_iter()
            .filter(|&kind| self.display.is_visible(kind))
            .collect();
        if lanes.is_empty() {
            return;
        }
        let lane_height =
            (rect.height() - LANE_GAP * (lanes.len() - 1) as f32) / lanes.len() as f32;

        for (row, kind) in lanes.into_iter().enumerate() {
            let top = rect.top() + row as f32 * (lane_height + LANE_GAP);
            let lane_rect =
                egui::Rect::from_min_size(egui::pos2(rect.left(), top), egui::vec2(rect.width(), lane_height));
            painter.rect_filled(lane_rect, 2.0, LANE_BACKGROUND);

            self.device.begin(lane_rect);
            if let Err(e) = self.display.submit_lane(&mut self.device, kind) {
                log::warn!("Failed to draw {:?} lane: {}", kind, e);
                continue;
            }
            painter.add(egui::Shape::mesh(self.device.finish()));
        }
    }
}

impl Drop for ScopeApp {
    fn drop(&mut self) {
        self.display.release(&mut self.device);
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_updates();
        self.collect_errors();
        ctx.request_repaint();

        egui::TopBottomPanel::top("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let window = self.view.window();
                ui.label(egui::RichText::new("View:").color(egui::Color32::LIGHT_GRAY));
                ui.label(
                    egui::RichText::new(format!("{:.3} - {:.3}", window.start(), window.end()))
                        .monospace()
                        .color(egui::Color32::WHITE),
                );
                ui.separator();
                ui.label(egui::RichText::new("Zoom:").color(egui::Color32::LIGHT_GRAY));
                ui.label(
                    egui::RichText::new(format!("{:.2}", self.view.zoom_level()))
                        .monospace()
                        .color(egui::Color32::WHITE),
                );
                if ui.small_button("Reset view").clicked() {
                    self.view.reset();
                }
                ui.separator();
                ui.label(
                    egui::RichText::new("drag: pan   shift-drag: local delay   alt-drag: remote delay")
                        .color(egui::Color32::GRAY)
                        .small(),
                );
                if !self.recent_errors.is_empty() && ui.small_button("Clear errors").clicked() {
                    self.recent_errors.clear();
                }
            });
        });

        egui::TopBottomPanel::bottom("debug_log")
            .resizable(true)
            .default_height(150.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new("Debug Log")
                            .color(egui::Color32::LIGHT_GRAY)
                            .strong(),
                    );
                    if ui.small_button("Clear").clicked() {
                        self.log_lines.clear();
                    }
                });
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &self.log_lines {
                            ui.label(
                                egui::RichText::new(line)
                                    .font(egui::FontId::monospace(11.0))
                                    .color(egui::Color32::from_rgb(180, 180, 180)),
                            );
                        }
                    });
            });

        egui::SidePanel::left("source_panel")
            .default_width(280.0)
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(8.0);
                let local = self.local;
                self.draw_source_controls(ui, local, "Local");
                ui.add_space(12.0);
                ui.separator();
                self.draw_remote_picker(ui);
                if let Some(remote) = self.remote {
                    ui.add_space(4.0);
                    self.draw_source_controls(ui, remote, "Remote");
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_lanes(ui);
        });
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list_devices {
        let devices = list_input_devices()?;
        if devices.is_empty() {
            eprintln!("No input devices found.");
        } else {
            for name in &devices {
                println!("{}", name);
            }
        }
        return Ok(());
    }

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let (tx, rx) = crossbeam_channel::unbounded::<GuiUpdate>();
    let logger = GuiLogger {
        tx,
        max_level: log_level,
    };
    log::set_boxed_logger(Box::new(logger)).ok();
    log::set_max_level(log_level);

    let mut config = match &args.config {
        Some(path) => ScopeConfig::load(path)?,
        None => ScopeConfig::default(),
    };
    if let Some(bpm) = args.bpm {
        config.capture.bpm = bpm;
    }
    config.validate()?;

    let mut registry = SourceRegistry::new();
    registry.add_listener(Box::new(RegistryLog));

    let local_shared = new_source(&config);
    let saved = match &args.load_state {
        Some(path) => Some(SavedState::from_json(&std::fs::read_to_string(path)?)?),
        None => None,
    };
    if let Some(saved) = &saved {
        saved.apply(&local_shared);
    }
    let local = match saved.and_then(|s| s.given_name) {
        Some(name) => registry.add_named(Arc::clone(&local_shared), name),
        None => registry.add(Arc::clone(&local_shared)),
    };

    let local_tone = ToneSource::new(config.audio.sample_rate);
    let remote_tone = ToneSource::in_phase_with(&local_tone);

    let local_source: Option<Box<dyn AudioSource>> = match &args.input {
        Some(path) => Some(Box::new(WavFileSource::new(path)?.looping(true))),
        None if args.tone => Some(Box::new(local_tone)),
        None => None,
    };
    let mut inputs = vec![start_source(
        &local_shared,
        local_source,
        &config,
        args.device.as_deref(),
    )?];

    let remote_source: Option<Box<dyn AudioSource>> = match &args.remote {
        Some(path) => Some(Box::new(WavFileSource::new(path)?.looping(true))),
        None if args.remote_tone => Some(Box::new(remote_tone)),
        None => None,
    };
    let remote = match remote_source {
        Some(source) => {
            let shared = new_source(&config);
            inputs.push(start_source(&shared, Some(source), &config, None)?);
            Some(registry.add(shared))
        }
        None => None,
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 750.0])
            .with_min_inner_size([800.0, 500.0])
            .with_title("beatscope"),
        ..Default::default()
    };

    eframe::run_native(
        "beatscope",
        native_options,
        Box::new(move |cc| {
            let app = ScopeApp::new(cc, rx, registry, local, remote, &config, inputs)?;
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    Ok(())
}
