#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod numeric;
pub mod parse;
pub mod plot;

use std::collections::BTreeMap;
use std::fmt;

use config::EngineConfig;
use document::{Document, ExpressionId, ExpressionStatus, SliderSettings};
use plot::{
    ArrowInstance, CachedGeometry, ExpressionKind, GroupHandle, MeshTemplate, PlotGeometry,
    PlotParameters,
};
use serde::Serialize;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            // no-op fallback when panic hook is disabled
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {
    // no-op fallback when debug logs are disabled
}

/// Wijzigingen in de scène sinds de vorige `get_geometry`-aanroep.
#[derive(Debug, Default, Serialize)]
struct GeometryDiff<'a> {
    /// Nieuwe groepen: topologie en attributen.
    added: Vec<GeometryExport<'a>>,
    /// Bestaande groepen: alleen attributen.
    updated: Vec<AttributeUpdate<'a>>,
    /// Groepen die de renderer moet opruimen.
    removed: Vec<GroupHandle>,
}

#[derive(Debug, Serialize)]
struct GeometryExport<'a> {
    handle: GroupHandle,
    expression: ExpressionId,
    kind: ExpressionKind,
    topology: TopologyExport<'a>,
    attributes: AttributeExport<'a>,
}

#[derive(Debug, Serialize)]
struct AttributeUpdate<'a> {
    handle: GroupHandle,
    revision: u64,
    attributes: AttributeExport<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TopologyExport<'a> {
    Grid {
        resolution: u32,
        indices: &'a [u32],
        uvs: &'a [[f64; 2]],
    },
    Tube {
        tubular_segments: usize,
        radial_segments: usize,
        indices: &'a [u32],
        uvs: &'a [[f64; 2]],
    },
    Arrows {
        template: &'a MeshTemplate,
    },
    Sphere {
        template: &'a MeshTemplate,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AttributeExport<'a> {
    Grid {
        positions: &'a [[f64; 3]],
        normals: &'a [[f64; 3]],
    },
    Tube {
        path: &'a [[f64; 3]],
        positions: &'a [[f64; 3]],
        normals: &'a [[f64; 3]],
    },
    Arrows {
        instances: &'a [ArrowInstance],
    },
    Point {
        center: [f64; 3],
    },
}

impl<'a> TopologyExport<'a> {
    fn of(geometry: &'a PlotGeometry) -> Self {
        match geometry {
            PlotGeometry::Grid(mesh) => Self::Grid {
                resolution: mesh.topology.resolution,
                indices: &mesh.topology.indices,
                uvs: &mesh.topology.uvs,
            },
            PlotGeometry::Tube(tube) => Self::Tube {
                tubular_segments: tube.topology.tubular_segments,
                radial_segments: tube.topology.radial_segments,
                indices: &tube.topology.indices,
                uvs: &tube.topology.uvs,
            },
            PlotGeometry::Arrows(field) => Self::Arrows {
                template: &field.template,
            },
            PlotGeometry::Point(marker) => Self::Sphere {
                template: &marker.template,
            },
        }
    }
}

impl<'a> AttributeExport<'a> {
    fn of(geometry: &'a PlotGeometry) -> Self {
        match geometry {
            PlotGeometry::Grid(mesh) => Self::Grid {
                positions: &mesh.positions,
                normals: &mesh.normals,
            },
            PlotGeometry::Tube(tube) => Self::Tube {
                path: &tube.path,
                positions: &tube.positions,
                normals: &tube.normals,
            },
            PlotGeometry::Arrows(field) => Self::Arrows {
                instances: &field.instances,
            },
            PlotGeometry::Point(marker) => Self::Point {
                center: marker.center,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpressionInfo<'a> {
    id: ExpressionId,
    order: usize,
    content: &'a str,
    kind: ExpressionKind,
    status: ExpressionStatus,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    slider: Option<&'a SliderSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a [f64]>,
    parameters: &'a PlotParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    handle: Option<GroupHandle>,
    animating: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheStatsExport {
    entries: usize,
    hits: usize,
    misses: usize,
    hit_rate: f64,
    estimated_memory_bytes: usize,
}

/// Public entry point for consumers.
#[wasm_bindgen]
pub struct Engine {
    initialized: bool,
    document: Document,
    /// Laatst geëxporteerde revisie per groep.
    exported: BTreeMap<GroupHandle, u64>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Engine {
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> Engine {
        Engine::from_config(&EngineConfig::interactive())
    }

    /// Maak een engine met een configuratieobject uit JS.
    #[wasm_bindgen]
    pub fn with_config(config: JsValue) -> Result<Engine, JsValue> {
        let config: EngineConfig = serde_wasm_bindgen::from_value(config).map_err(to_js_error)?;
        config.validate().map_err(to_js_error)?;
        Ok(Engine::from_config(&config))
    }

    /// Geeft terug of de engine de minimale initialisatie heeft doorlopen.
    #[wasm_bindgen]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Voeg een expressie toe; geeft het id terug.
    #[wasm_bindgen]
    pub fn add_expression(&mut self, content: &str) -> u64 {
        self.document.add(content).0
    }

    #[wasm_bindgen]
    pub fn remove_expression(&mut self, id: u64) -> Result<(), JsValue> {
        self.document.remove(ExpressionId(id)).map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn move_expression(&mut self, id: u64, order: usize) -> Result<(), JsValue> {
        self.document
            .move_to(ExpressionId(id), order)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn set_content(&mut self, id: u64, content: &str) -> Result<(), JsValue> {
        self.document
            .set_content(ExpressionId(id), content)
            .map_err(to_js_error)
    }

    /// Stel de inhoud in vanuit de LaTeX van de formule-editor.
    #[wasm_bindgen]
    pub fn set_latex(&mut self, id: u64, latex: &str) -> Result<(), JsValue> {
        self.document
            .set_latex(ExpressionId(id), latex)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn set_enabled(&mut self, id: u64, enabled: bool) -> Result<(), JsValue> {
        self.document
            .set_enabled(ExpressionId(id), enabled)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn set_parameter(&mut self, id: u64, name: &str, value: f64) -> Result<(), JsValue> {
        self.document
            .set_parameter(ExpressionId(id), name, value)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn clear_parameter(&mut self, id: u64, name: &str) -> Result<(), JsValue> {
        self.document
            .clear_parameter(ExpressionId(id), name)
            .map_err(to_js_error)
    }

    /// Stel een sliderwaarde in; geeft de begrensde waarde terug.
    #[wasm_bindgen]
    pub fn set_variable_value(&mut self, id: u64, value: f64) -> Result<f64, JsValue> {
        self.document
            .set_variable_value(ExpressionId(id), value)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn configure_slider(
        &mut self,
        id: u64,
        min: f64,
        max: f64,
        speed: f64,
    ) -> Result<(), JsValue> {
        self.document
            .configure_slider(ExpressionId(id), min, max, speed)
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn start_animation(&mut self, id: u64) -> Result<(), JsValue> {
        self.document
            .start_animation(ExpressionId(id))
            .map(|_| ())
            .map_err(to_js_error)
    }

    #[wasm_bindgen]
    pub fn stop_animation(&mut self, id: u64) -> bool {
        self.document.stop_animation(ExpressionId(id))
    }

    /// Eén animatieframe; `true` als er iets geëvalueerd werd.
    #[wasm_bindgen]
    pub fn tick(&mut self) -> bool {
        self.document.tick().is_some()
    }

    /// Evalueer het hele document en geef het rapport terug.
    #[wasm_bindgen]
    pub fn evaluate(&mut self) -> Result<JsValue, JsValue> {
        let report = self.document.evaluate();
        serde_wasm_bindgen::to_value(&report).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Haalt de expressielijst op voor de UI.
    #[wasm_bindgen]
    pub fn get_expressions(&self) -> Result<JsValue, JsValue> {
        let infos: Vec<ExpressionInfo<'_>> = self
            .document
            .expressions()
            .iter()
            .map(|expr| ExpressionInfo {
                id: expr.id(),
                order: expr.order(),
                content: expr.content(),
                kind: expr.kind(),
                status: expr.status(),
                enabled: expr.is_enabled(),
                error: expr.error().map(ToString::to_string),
                slider: expr.slider(),
                output: expr.output(),
                parameters: expr.parameters(),
                handle: expr.geometry().map(|cached| cached.handle),
                animating: self.document.is_animating(expr.id()),
            })
            .collect();
        serde_wasm_bindgen::to_value(&infos).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Haalt de geometrie op in een "diff" formaat.
    #[wasm_bindgen]
    pub fn get_geometry(&mut self) -> Result<JsValue, JsValue> {
        let released = self.document.take_released();
        let diff = collect_diff(&self.document, &mut self.exported, &released);
        serde_wasm_bindgen::to_value(&diff).map_err(|err| JsError::new(&err.to_string()).into())
    }

    #[wasm_bindgen]
    pub fn get_cache_stats(&self) -> Result<JsValue, JsValue> {
        let stats = self.document.geometry_cache().topology().stats();
        let export = CacheStatsExport {
            entries: stats.total_entries(),
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
            estimated_memory_bytes: stats.estimated_memory_bytes,
        };
        serde_wasm_bindgen::to_value(&export).map_err(|err| JsError::new(&err.to_string()).into())
    }
}

impl Engine {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            initialized: true,
            document: Document::new(config),
            exported: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }
}

/// Vergelijkt de huidige geometrie met wat de renderer al heeft.
fn collect_diff<'a>(
    document: &'a Document,
    exported: &mut BTreeMap<GroupHandle, u64>,
    released: &[GroupHandle],
) -> GeometryDiff<'a> {
    let mut diff = GeometryDiff::default();

    for handle in released {
        if exported.remove(handle).is_some() {
            diff.removed.push(*handle);
        }
    }

    for expr in document.expressions() {
        let Some(cached) = expr.geometry() else {
            continue;
        };
        match exported.insert(cached.handle, cached.revision) {
            None => diff.added.push(export_geometry(expr.id(), cached)),
            Some(revision) if revision != cached.revision => diff.updated.push(AttributeUpdate {
                handle: cached.handle,
                revision: cached.revision,
                attributes: AttributeExport::of(&cached.geometry),
            }),
            Some(_) => {}
        }
    }

    diff
}

fn export_geometry(expression: ExpressionId, cached: &CachedGeometry) -> GeometryExport<'_> {
    GeometryExport {
        handle: cached.handle,
        expression,
        kind: cached.kind,
        topology: TopologyExport::of(&cached.geometry),
        attributes: AttributeExport::of(&cached.geometry),
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
