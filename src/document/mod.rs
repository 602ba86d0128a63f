//! Het document: de geordende lijst expressies en hun evaluatie.
//!
//! Het document bezit alle expressies en via de [`GeometryCache`] hun
//! geometrie. Elke mutatie neemt `&mut self`, zodat een evaluatieronde nooit
//! zichzelf opnieuw kan starten.

pub mod animation;
pub mod evaluator;
pub mod expression;

use std::collections::BTreeSet;
use std::fmt;

use crate::config::EngineConfig;
use crate::numeric::{Builtins, Scope};
use crate::parse::{ParseError, normalize_latex};
use crate::plot::{ExpressionKind, GeometryCache, GroupHandle, ParameterError, PlotDefaults};

pub use animation::{Animator, CancellationToken, advance};
pub use evaluator::{EvaluationReport, ReportEntry};
pub use expression::{
    Expression, ExpressionError, ExpressionId, ExpressionStatus, SliderSettings,
};

use evaluator::Pass;

/// Fouten van documentoperaties.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    UnknownExpression(ExpressionId),
    Parameter(ParameterError),
    Parse(ParseError),
    /// De operatie vraagt een variabele.
    NotAVariable(ExpressionId),
    NonFiniteValue(f64),
    InvalidSlider(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownExpression(id) => write!(f, "onbekende expressie {id}"),
            Self::Parameter(err) => write!(f, "ongeldige parameter: {err}"),
            Self::Parse(err) => write!(f, "parsefout: {err}"),
            Self::NotAVariable(id) => write!(f, "expressie {id} is geen variabele"),
            Self::NonFiniteValue(value) => write!(f, "waarde moet een eindig getal zijn, kreeg {value}"),
            Self::InvalidSlider(reason) => write!(f, "ongeldige sliderinstelling: {reason}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<ParameterError> for DocumentError {
    fn from(err: ParameterError) -> Self {
        Self::Parameter(err)
    }
}

impl From<ParseError> for DocumentError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

#[derive(Debug)]
pub struct Document {
    /// Altijd gesorteerd op `order`, dicht genummerd vanaf 1.
    expressions: Vec<Expression>,
    next_id: u64,
    cache: GeometryCache,
    defaults: PlotDefaults,
    builtins: Builtins,
    animator: Animator,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Document {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            expressions: Vec::new(),
            next_id: 1,
            cache: GeometryCache::new(config.style),
            defaults: config.plot_defaults(),
            builtins: Builtins::new(),
            animator: Animator::default(),
        }
    }

    #[must_use]
    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    #[must_use]
    pub fn expression(&self, id: ExpressionId) -> Option<&Expression> {
        self.expressions.iter().find(|expr| expr.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    #[must_use]
    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.cache
    }

    #[must_use]
    pub fn plot_defaults(&self) -> PlotDefaults {
        self.defaults
    }

    /// Voegt een expressie achteraan toe en evalueert het document.
    pub fn add(&mut self, content: &str) -> ExpressionId {
        let id = ExpressionId(self.next_id);
        self.next_id += 1;
        let order = self.expressions.iter().map(|expr| expr.order).max().unwrap_or(0) + 1;
        self.expressions.push(Expression::new(id, order, content));
        self.evaluate();
        id
    }

    /// Verwijdert een expressie, geeft haar geometrie vrij en nummert de
    /// overige expressies opnieuw vanaf 1.
    pub fn remove(&mut self, id: ExpressionId) -> Result<(), DocumentError> {
        let index = self.index_of(id)?;
        let mut removed = self.expressions.remove(index);
        self.cache.release(&mut removed.geometry);
        self.animator.stop(id);
        self.recompact();
        self.evaluate();
        Ok(())
    }

    /// Verplaatst een expressie naar positie `order` (1-gebaseerd, begrensd).
    pub fn move_to(&mut self, id: ExpressionId, order: usize) -> Result<(), DocumentError> {
        let index = self.index_of(id)?;
        let target = order.clamp(1, self.expressions.len()) - 1;
        let expr = self.expressions.remove(index);
        self.expressions.insert(target, expr);
        self.recompact();
        self.evaluate();
        Ok(())
    }

    /// Vervangt de inhoud en evalueert het hele document.
    pub fn set_content(&mut self, id: ExpressionId, content: &str) -> Result<(), DocumentError> {
        let expr = self.expression_mut(id)?;
        if expr.content != content {
            content.clone_into(&mut expr.content);
            expr.dirty = true;
        }
        self.evaluate();
        Ok(())
    }

    /// Zoals [`Self::set_content`], maar met LaTeX uit de formule-editor.
    pub fn set_latex(&mut self, id: ExpressionId, latex: &str) -> Result<(), DocumentError> {
        let content = if latex.trim_start().starts_with("//") {
            latex.to_owned()
        } else {
            normalize_latex(latex)?
        };
        self.set_content(id, &content)
    }

    pub fn set_enabled(&mut self, id: ExpressionId, enabled: bool) -> Result<(), DocumentError> {
        let expr = self.expression_mut(id)?;
        if expr.enabled != enabled {
            expr.enabled = enabled;
            expr.dirty = true;
        }
        self.evaluate_affected(&BTreeSet::new());
        Ok(())
    }

    /// Zet een grensparameter (`xMin`, `resolution`, …). Ongeldige waarden
    /// worden geweigerd voordat er iets gesampled wordt.
    pub fn set_parameter(
        &mut self,
        id: ExpressionId,
        name: &str,
        value: f64,
    ) -> Result<(), DocumentError> {
        let defaults = self.defaults;
        let expr = self.expression_mut(id)?;
        let mut parameters = expr.parameters.clone();
        parameters.set(name, value)?;
        if expr.kind.is_plottable() {
            // Valideer het geheel (bijv. min > max) tegen de huidige soort.
            parameters.resolve(expr.kind, &defaults)?;
        }
        expr.parameters = parameters;
        expr.dirty = true;
        self.evaluate_affected(&BTreeSet::new());
        Ok(())
    }

    pub fn clear_parameter(&mut self, id: ExpressionId, name: &str) -> Result<(), DocumentError> {
        let expr = self.expression_mut(id)?;
        expr.parameters.clear(name)?;
        expr.dirty = true;
        self.evaluate_affected(&BTreeSet::new());
        Ok(())
    }

    /// Slider: begrenst `value`, herschrijft de inhoud als `naam=waarde` en
    /// evalueert alleen wat van de variabele afhangt. Geeft de gebruikte
    /// waarde terug.
    pub fn set_variable_value(&mut self, id: ExpressionId, value: f64) -> Result<f64, DocumentError> {
        if !value.is_finite() {
            return Err(DocumentError::NonFiniteValue(value));
        }
        let (name, value) = self.write_variable(id, |slider| slider.clamp(value))?;
        self.evaluate_affected(&BTreeSet::from([name]));
        Ok(value)
    }

    /// Past het bereik en de animatiesnelheid van een slider aan.
    pub fn configure_slider(
        &mut self,
        id: ExpressionId,
        min: f64,
        max: f64,
        speed: f64,
    ) -> Result<(), DocumentError> {
        if !(min.is_finite() && max.is_finite() && speed.is_finite()) {
            return Err(DocumentError::InvalidSlider("niet-eindige waarde".into()));
        }
        if min >= max {
            return Err(DocumentError::InvalidSlider(format!("min {min} >= max {max}")));
        }
        if speed <= 0.0 {
            return Err(DocumentError::InvalidSlider(format!("snelheid {speed} <= 0")));
        }
        let expr = self.expression_mut(id)?;
        let slider = expr.slider.as_mut().ok_or(DocumentError::NotAVariable(id))?;
        slider.min = min;
        slider.max = max;
        slider.speed = speed;
        let clamped = slider.clamp(slider.value);
        if clamped != slider.value {
            self.set_variable_value(id, clamped)?;
        }
        Ok(())
    }

    /// Volledige ronde in oplopende volgorde met een verse scope.
    pub fn evaluate(&mut self) -> EvaluationReport {
        self.run_pass(None)
    }

    /// Selectieve ronde: bindingen worden altijd opnieuw berekend, geometrie
    /// alleen voor expressies die gewijzigd zijn, nog geen geometrie hebben of
    /// (transitief) van een naam in `changed` afhangen.
    pub fn evaluate_affected(&mut self, changed: &BTreeSet<String>) -> EvaluationReport {
        self.run_pass(Some(changed.clone()))
    }

    /// Start de animatie van een variabele.
    pub fn start_animation(&mut self, id: ExpressionId) -> Result<CancellationToken, DocumentError> {
        let expr = self.expression_mut(id)?;
        if expr.kind != ExpressionKind::Variable || expr.slider.is_none() {
            return Err(DocumentError::NotAVariable(id));
        }
        Ok(self.animator.start(id))
    }

    pub fn stop_animation(&mut self, id: ExpressionId) -> bool {
        self.animator.stop(id)
    }

    #[must_use]
    pub fn is_animating(&self, id: ExpressionId) -> bool {
        self.animator.is_animating(id)
    }

    /// Eén animatieframe. `None` als er geen animatie loopt.
    pub fn tick(&mut self) -> Option<EvaluationReport> {
        let active = self.animator.active();
        if active.is_empty() {
            return None;
        }

        let mut changed = BTreeSet::new();
        for id in active {
            match self.write_variable(id, advance) {
                Ok((name, _)) => {
                    changed.insert(name);
                }
                Err(err) => {
                    log::debug!("animatie van {id} gestopt: {err}");
                    self.animator.stop(id);
                }
            }
        }
        if changed.is_empty() {
            return None;
        }
        Some(self.evaluate_affected(&changed))
    }

    /// Handles die de renderer moet opruimen.
    pub fn take_released(&mut self) -> Vec<GroupHandle> {
        self.cache.take_released()
    }

    fn run_pass(&mut self, affected: Option<BTreeSet<String>>) -> EvaluationReport {
        let scope = Scope::new(self.builtins.clone());
        let mut pass = Pass {
            cache: &mut self.cache,
            defaults: self.defaults,
            affected,
        };
        let report = evaluator::run(&mut self.expressions, scope, &mut pass);
        let pruned = self.cache.topology_mut().prune_unused();
        if pruned > 0 {
            log::debug!("{pruned} ongebruikte topologieën opgeruimd");
        }
        report
    }

    /// Schrijft een nieuwe sliderwaarde naar de inhoud van variabele `id`.
    fn write_variable(
        &mut self,
        id: ExpressionId,
        next: impl FnOnce(&SliderSettings) -> f64,
    ) -> Result<(String, f64), DocumentError> {
        let expr = self.expression_mut(id)?;
        if expr.kind != ExpressionKind::Variable {
            return Err(DocumentError::NotAVariable(id));
        }
        let name = expr
            .defined_name
            .clone()
            .ok_or(DocumentError::NotAVariable(id))?;
        let slider = expr.slider.as_mut().ok_or(DocumentError::NotAVariable(id))?;
        let value = next(slider);
        slider.value = value;
        expr.content = format!("{name}={value:.2}");
        Ok((name, value))
    }

    fn recompact(&mut self) {
        for (index, expr) in self.expressions.iter_mut().enumerate() {
            expr.order = index + 1;
        }
    }

    fn index_of(&self, id: ExpressionId) -> Result<usize, DocumentError> {
        self.expressions
            .iter()
            .position(|expr| expr.id == id)
            .ok_or(DocumentError::UnknownExpression(id))
    }

    fn expression_mut(&mut self, id: ExpressionId) -> Result<&mut Expression, DocumentError> {
        self.expressions
            .iter_mut()
            .find(|expr| expr.id == id)
            .ok_or(DocumentError::UnknownExpression(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::{PlotGeometry, TubeStyle, UpdateKind};

    fn document() -> Document {
        Document::new(&EngineConfig {
            surface_resolution: Some(4),
            ..EngineConfig::default()
        })
    }

    fn orders(doc: &Document) -> Vec<(u64, usize)> {
        doc.expressions()
            .iter()
            .map(|expr| (expr.id().0, expr.order()))
            .collect()
    }

    #[test]
    fn add_assigns_dense_orders_and_unique_ids() {
        let mut doc = document();
        let a = doc.add("a = 1");
        let b = doc.add("");
        let c = doc.add("a * x");
        assert_ne!(a, b);
        assert_eq!(orders(&doc), vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(doc.expression(b).unwrap().status(), ExpressionStatus::Empty);
        assert_eq!(doc.expression(c).unwrap().status(), ExpressionStatus::Plotted);
    }

    #[test]
    fn remove_recompacts_and_releases() {
        let mut doc = document();
        let a = doc.add("x");
        let b = doc.add("y");
        let c = doc.add("x * y");
        let handle = doc.expression(b).unwrap().geometry().unwrap().handle;
        doc.take_released();

        doc.remove(b).unwrap();
        assert_eq!(orders(&doc), vec![(a.0, 1), (c.0, 2)]);
        assert_eq!(doc.take_released(), vec![handle]);

        // Ids are never reused.
        let d = doc.add("1");
        assert_eq!(d, ExpressionId(4));
        assert_eq!(doc.remove(b), Err(DocumentError::UnknownExpression(b)));
    }

    #[test]
    fn order_controls_scope() {
        let mut doc = document();
        let surface = doc.add("k * x");
        let k = doc.add("k = 2");
        assert_eq!(doc.expression(surface).unwrap().status(), ExpressionStatus::Failed);

        doc.move_to(k, 1).unwrap();
        assert_eq!(doc.expression(surface).unwrap().status(), ExpressionStatus::Plotted);
        assert_eq!(doc.expression(k).unwrap().order(), 1);
    }

    #[test]
    fn failures_do_not_stop_later_expressions() {
        let mut doc = document();
        let bad = doc.add("a = nosuch + 1");
        let good = doc.add("x + y");
        let uses_a = doc.add("a * x");

        assert_eq!(doc.expression(bad).unwrap().status(), ExpressionStatus::Failed);
        assert!(doc.expression(bad).unwrap().geometry().is_none());
        assert_eq!(doc.expression(good).unwrap().status(), ExpressionStatus::Plotted);
        assert!(matches!(
            doc.expression(uses_a).unwrap().error(),
            Some(ExpressionError::Compilation(_))
        ));
    }

    #[test]
    fn slider_refreshes_dependent_geometry_in_place() {
        let mut doc = document();
        let a = doc.add("a = 1");
        let surface = doc.add("a * x * y");
        let unrelated = doc.add("x - y");
        let before = doc.expression(surface).unwrap().geometry().unwrap().clone();
        let unrelated_revision = doc.expression(unrelated).unwrap().geometry().unwrap().revision;

        let value = doc.set_variable_value(a, 2.5).unwrap();
        assert_eq!(value, 2.5);
        assert_eq!(doc.expression(a).unwrap().content(), "a=2.50");

        let cached = doc.expression(surface).unwrap().geometry().unwrap();
        assert_eq!(cached.handle, before.handle);
        assert_eq!(cached.revision, before.revision + 1);
        assert_ne!(cached.geometry, before.geometry);
        // Unrelated geometry is not touched by the selective pass.
        assert_eq!(
            doc.expression(unrelated).unwrap().geometry().unwrap().revision,
            unrelated_revision
        );
    }

    #[test]
    fn slider_values_are_clamped() {
        let mut doc = document();
        let a = doc.add("a = 1");
        assert_eq!(doc.set_variable_value(a, 50.0).unwrap(), 10.0);
        assert_eq!(doc.expression(a).unwrap().content(), "a=10.00");

        let s = doc.add("x");
        assert_eq!(doc.set_variable_value(s, 1.0), Err(DocumentError::NotAVariable(s)));
    }

    #[test]
    fn dependencies_propagate_through_definitions() {
        let mut doc = document();
        let a = doc.add("a = 1");
        doc.add("b = a * 2");
        doc.add("g(q) = q * b");
        let surface = doc.add("g(x) + y");

        let revision = doc.expression(surface).unwrap().geometry().unwrap().revision;
        doc.set_variable_value(a, 3.0).unwrap();
        let cached = doc.expression(surface).unwrap().geometry().unwrap();
        assert_eq!(cached.revision, revision + 1);
        let PlotGeometry::Grid(mesh) = &cached.geometry else {
            panic!("expected grid");
        };
        // x = -10, y = -10 at vertex 0: g(-10) + (-10) = -10 * 6 - 10.
        assert!((mesh.positions[0][1] + 70.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_expressions_keep_bindings() {
        let mut doc = document();
        let k = doc.add("f(x, y) = x * y");
        let user = doc.add("f(x, 2) + y");
        assert_eq!(doc.expression(k).unwrap().kind(), ExpressionKind::Surface);

        doc.set_enabled(k, false).unwrap();
        let expr = doc.expression(k).unwrap();
        assert_eq!(expr.status(), ExpressionStatus::Disabled);
        assert!(expr.geometry().is_none());
        assert_eq!(doc.expression(user).unwrap().status(), ExpressionStatus::Plotted);

        doc.set_enabled(k, true).unwrap();
        assert_eq!(doc.expression(k).unwrap().status(), ExpressionStatus::Plotted);
    }

    #[test]
    fn parameters_are_validated_before_sampling() {
        let mut doc = document();
        let s = doc.add("x + y");
        assert!(matches!(
            doc.set_parameter(s, "xMin", 20.0),
            Err(DocumentError::Parameter(ParameterError::InvertedRange { .. }))
        ));
        assert!(matches!(
            doc.set_parameter(s, "depth", 1.0),
            Err(DocumentError::Parameter(ParameterError::UnknownParameter(_)))
        ));

        let handle = doc.expression(s).unwrap().geometry().unwrap().handle;
        doc.set_parameter(s, "resolution", 2.0).unwrap();
        let cached = doc.expression(s).unwrap().geometry().unwrap();
        assert_ne!(cached.handle, handle);
        assert_eq!(cached.geometry.vertex_count(), 9);

        doc.clear_parameter(s, "resolution").unwrap();
        assert_eq!(doc.expression(s).unwrap().geometry().unwrap().geometry.vertex_count(), 25);
    }

    #[test]
    fn directive_bounds_use_the_scope() {
        let mut doc = document();
        doc.add("k = 3");
        let line = doc.add("sl3([cos(t), sin(t), t], 0, k)");
        let expr = doc.expression(line).unwrap();
        assert_eq!(expr.kind(), ExpressionKind::ParametricLine);
        assert!(expr.dependencies().contains("k"));
        let PlotGeometry::Tube(tube) = &expr.geometry().unwrap().geometry else {
            panic!("expected tube");
        };
        let samples = 301;
        assert_eq!(tube.path.len(), TubeStyle::default().tubular_segments(samples) + 1);
    }

    #[test]
    fn mismatched_directive_is_inert() {
        let mut doc = document();
        let id = doc.add("point(x + y)");
        let expr = doc.expression(id).unwrap();
        assert_eq!(expr.status(), ExpressionStatus::Inert);
        assert!(matches!(
            expr.error(),
            Some(ExpressionError::ClassificationAmbiguous { arity: 1, .. })
        ));
    }

    #[test]
    fn output_tracks_its_dependencies() {
        let mut doc = document();
        let a = doc.add("a = 2");
        let echo = doc.add("output([a, 2*a, 3])");
        let scalar = doc.add("o(a + 1)");
        let free = doc.add("o(x)");

        let expr = doc.expression(echo).unwrap();
        assert_eq!(expr.kind(), ExpressionKind::Output);
        assert_eq!(expr.status(), ExpressionStatus::Evaluated);
        assert!(expr.geometry().is_none());
        assert_eq!(expr.output(), Some(&[2.0, 4.0, 3.0][..]));
        assert_eq!(doc.expression(scalar).unwrap().output(), Some(&[3.0][..]));
        assert_eq!(doc.expression(free).unwrap().status(), ExpressionStatus::Failed);
        assert!(doc.expression(free).unwrap().output().is_none());

        doc.set_variable_value(a, 3.0).unwrap();
        assert_eq!(doc.expression(echo).unwrap().output(), Some(&[3.0, 6.0, 3.0][..]));
        assert_eq!(doc.expression(scalar).unwrap().output(), Some(&[4.0][..]));
    }

    #[test]
    fn zero_parameter_function_is_bound() {
        let mut doc = document();
        let id = doc.add("k() = 3");
        let expr = doc.expression(id).unwrap();
        assert_eq!(expr.kind(), ExpressionKind::FunctionDef);
        assert_eq!(expr.status(), ExpressionStatus::Bound);
        assert_eq!(expr.defined_name(), Some("k"));
    }

    #[test]
    fn shape_change_forces_rebuild() {
        let mut doc = document();
        let id = doc.add("x");
        let handle = doc.expression(id).unwrap().geometry().unwrap().handle;

        doc.set_content(id, "x + 0 * y").unwrap();
        let cached = doc.expression(id).unwrap().geometry().unwrap();
        assert_ne!(cached.handle, handle);

        let before = cached.handle;
        let report = doc.evaluate();
        assert_eq!(report.entry(id).unwrap().update, Some(UpdateKind::Refreshed));
        assert_eq!(doc.expression(id).unwrap().geometry().unwrap().handle, before);
    }

    #[test]
    fn animation_ticks_until_cancelled() {
        let mut doc = document();
        let a = doc.add("a = 0");
        doc.add("a * x");
        assert!(doc.tick().is_none());

        let token = doc.start_animation(a).unwrap();
        let report = doc.tick().unwrap();
        assert_eq!(report.count_updates(UpdateKind::Refreshed), 1);
        assert_eq!(doc.expression(a).unwrap().content(), "a=0.20");

        token.cancel();
        assert!(doc.tick().is_none());
        assert_eq!(doc.expression(a).unwrap().content(), "a=0.20");
        assert!(!doc.is_animating(a));
    }

    #[test]
    fn latex_content_is_normalized() {
        let mut doc = document();
        let id = doc.add("");
        doc.set_latex(id, r"\frac{x}{2}\cdot y").unwrap();
        let expr = doc.expression(id).unwrap();
        assert_eq!(expr.content(), "((x)/(2))*y");
        assert_eq!(expr.kind(), ExpressionKind::Surface);
    }
}
