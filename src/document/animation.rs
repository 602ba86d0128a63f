//! Animatie van variabelen als coöperatieve, herhalende taak.
//!
//! De host roept [`super::Document::tick`] één keer per frame aan. Elke
//! lopende animatie heeft een [`CancellationToken`]; een geannuleerde taak
//! wordt bij de volgende tick opgeruimd zonder nog iets te wijzigen.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::expression::{ExpressionId, SliderSettings};

/// Gedeelde annuleringsvlag voor één animatietaak.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Default)]
pub struct Animator {
    tasks: BTreeMap<ExpressionId, CancellationToken>,
}

impl Animator {
    /// Start (of herstart) de animatie van `id`. Een eerdere taak voor
    /// dezelfde expressie wordt geannuleerd.
    pub fn start(&mut self, id: ExpressionId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tasks.insert(id, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Stopt de animatie van `id`; `false` als er geen liep.
    pub fn stop(&mut self, id: ExpressionId) -> bool {
        match self.tasks.remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_animating(&self, id: ExpressionId) -> bool {
        self.tasks.get(&id).is_some_and(|token| !token.is_cancelled())
    }

    /// Ruimt geannuleerde taken op en geeft de nog lopende terug.
    pub fn active(&mut self) -> Vec<ExpressionId> {
        self.tasks.retain(|_, token| !token.is_cancelled());
        self.tasks.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Volgende animatiewaarde: één honderdste van het bereik maal de snelheid,
/// terug naar `min` voorbij `max`.
#[must_use]
pub fn advance(slider: &SliderSettings) -> f64 {
    let step = (slider.max - slider.min) / 100.0 * slider.speed;
    let next = slider.value + step;
    if next > slider.max { slider.min } else { next }
}
