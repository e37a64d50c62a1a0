//! Surface Pair
//!
//! Fixed two-slot pool of surfaces with an index naming the active one.
//! Swapping flips the index; surfaces never move. This is the only place
//! that changes surface visibility, so the single-active invariant can be
//! checked here.

use crate::surface::MediaSurface;

/// Slot index of a surface within the pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Slot {
    /// First surface (primary at startup)
    Primary,
    /// Second surface
    Secondary,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    /// The other slot
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// Two interchangeable surfaces, exactly one of them active
pub struct SurfacePair<S> {
    surfaces: [S; 2],
    active: Slot,
}

impl<S: MediaSurface> SurfacePair<S> {
    /// Take ownership of two surfaces; the first becomes active and visible
    pub fn new(primary: S, secondary: S) -> Self {
        let mut pair = Self {
            surfaces: [primary, secondary],
            active: Slot::Primary,
        };
        pair.apply_visibility();
        pair.inactive_mut().set_muted(true);
        pair
    }

    /// Slot currently shown
    #[must_use]
    pub fn active_slot(&self) -> Slot {
        self.active
    }

    /// Surface currently shown
    pub fn active(&self) -> &S {
        &self.surfaces[self.active.index()]
    }

    /// Surface currently shown, mutably
    pub fn active_mut(&mut self) -> &mut S {
        &mut self.surfaces[self.active.index()]
    }

    /// Hidden surface available for preloading
    pub fn inactive(&self) -> &S {
        &self.surfaces[self.active.other().index()]
    }

    /// Hidden surface available for preloading, mutably
    pub fn inactive_mut(&mut self) -> &mut S {
        &mut self.surfaces[self.active.other().index()]
    }

    /// Hand the active role to the other surface
    ///
    /// The newly active surface is shown and unmuted; the previous one is
    /// paused, muted and hidden.
    pub fn swap(&mut self) {
        self.active = self.active.other();
        self.apply_visibility();

        let previous = self.inactive_mut();
        previous.pause();
        previous.set_muted(true);

        self.active_mut().set_muted(false);
    }

    /// Number of surfaces reporting themselves visible
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.surfaces.iter().filter(|s| s.is_visible()).count()
    }

    /// Exactly one surface is visible, and it is the active one
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.visible_count() == 1 && self.active().is_visible()
    }

    fn apply_visibility(&mut self) {
        let active = self.active.index();
        for (i, surface) in self.surfaces.iter_mut().enumerate() {
            surface.set_visible(i == active);
        }
    }
}
