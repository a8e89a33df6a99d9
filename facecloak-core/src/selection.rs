//! Selection state for one detection pass.
//!
//! Every transition consumes a [`Selection`] and returns the next one, so a sequence of
//! user events can be replayed deterministically without any UI attached.

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{MaskError, Result};
use crate::face::{DetectionPass, Face, FaceId, PassId};

/// Interaction tool. The pen selects, the eraser deselects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Pen => "pen",
            Tool::Eraser => "eraser",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pen" => Ok(Tool::Pen),
            "eraser" => Ok(Tool::Eraser),
            other => Err(format!("invalid tool '{other}'; expected 'pen' or 'eraser'")),
        }
    }
}

/// Which faces of one detection pass are selected for masking.
///
/// The key set always equals the id set of the pass the selection was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pass: PassId,
    state: BTreeMap<FaceId, bool>,
}

impl Selection {
    /// Fresh selection with every face selected.
    pub fn new(pass: &DetectionPass) -> Self {
        Self {
            pass: pass.id(),
            state: pass.ids().map(|id| (id, true)).collect(),
        }
    }

    /// Selection with exactly `ids` selected.
    pub fn from_ids(pass: &DetectionPass, ids: impl IntoIterator<Item = FaceId>) -> Result<Self> {
        ids.into_iter()
            .try_fold(Self::new(pass).select_none(), |selection, id| {
                selection.toggle(id, Tool::Pen)
            })
    }

    pub fn pass_id(&self) -> PassId {
        self.pass
    }

    pub fn select_all(mut self) -> Self {
        self.state.values_mut().for_each(|selected| *selected = true);
        self
    }

    pub fn select_none(mut self) -> Self {
        self.state.values_mut().for_each(|selected| *selected = false);
        self
    }

    /// Set one face according to `tool`. Re-applying the same tool is a no-op.
    pub fn toggle(mut self, id: FaceId, tool: Tool) -> Result<Self> {
        let selected = self.state.get_mut(&id).ok_or(MaskError::UnknownFace(id))?;
        *selected = tool == Tool::Pen;
        Ok(self)
    }

    /// Apply `tool` to the face under `(x, y)` in original-image pixels.
    ///
    /// A point that hits no face leaves the selection unchanged.
    pub fn apply_tool_at(self, pass: &DetectionPass, x: u32, y: u32, tool: Tool) -> Result<Self> {
        self.ensure_pass(pass)?;
        match hit_test(pass.faces(), x, y) {
            Some(id) => self.toggle(id, tool),
            None => Ok(self),
        }
    }

    /// `None` when `id` is not part of the pass.
    pub fn is_selected(&self, id: FaceId) -> Option<bool> {
        self.state.get(&id).copied()
    }

    /// Selected ids in ascending order.
    pub fn selected_ids(&self) -> Vec<FaceId> {
        self.state
            .iter()
            .filter_map(|(id, selected)| selected.then_some(*id))
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.state.values().filter(|selected| **selected).count()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Full `id -> selected` mapping.
    pub fn state(&self) -> &BTreeMap<FaceId, bool> {
        &self.state
    }

    /// Reject a selection that was built against a different detection pass.
    pub fn ensure_pass(&self, pass: &DetectionPass) -> Result<()> {
        if self.pass != pass.id() {
            return Err(MaskError::StaleSession(
                "selection belongs to a previous detection pass".into(),
            ));
        }
        Ok(())
    }
}

/// Id of the first face, in canonical order, whose box contains `(x, y)` (edges inclusive).
///
/// A face nested inside a larger one is shadowed by it.
pub fn hit_test(faces: &[Face], x: u32, y: u32) -> Option<FaceId> {
    faces
        .iter()
        .find(|face| face.bbox().contains(x, y))
        .map(Face::id)
}

/// Placement of an image drawn scaled and centred on a display canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub image_size: (u32, u32),
}

impl Viewport {
    /// Fit `image_size` inside `canvas_size`, preserving aspect ratio and centring it.
    pub fn fit(image_size: (u32, u32), canvas_size: (u32, u32)) -> Self {
        let (img_w, img_h) = (image_size.0.max(1) as f32, image_size.1.max(1) as f32);
        let (canvas_w, canvas_h) = (canvas_size.0 as f32, canvas_size.1 as f32);

        let (new_w, new_h) = if img_w / img_h > canvas_w / canvas_h.max(1.0) {
            (canvas_w, (canvas_w * img_h / img_w).floor())
        } else {
            ((canvas_h * img_w / img_h).floor(), canvas_h)
        };

        Self {
            scale_x: new_w / img_w,
            scale_y: new_h / img_h,
            offset_x: ((canvas_w - new_w) / 2.0).floor(),
            offset_y: ((canvas_h - new_h) / 2.0).floor(),
            image_size,
        }
    }

    /// Map a display point into original-image pixels; `None` outside the drawn image.
    pub fn to_original(&self, x: f32, y: f32) -> Option<(u32, u32)> {
        if self.scale_x <= 0.0 || self.scale_y <= 0.0 {
            return None;
        }
        let ox = (x - self.offset_x) / self.scale_x;
        let oy = (y - self.offset_y) / self.scale_y;
        let (width, height) = self.image_size;
        if ox < 0.0 || oy < 0.0 || ox >= width as f32 || oy >= height as f32 {
            return None;
        }
        Some((ox as u32, oy as u32))
    }
}

/// One user interaction against a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    SelectAll,
    SelectNone,
    /// Apply a tool to a face by id (`pen:3`).
    Face { tool: Tool, id: FaceId },
    /// Apply a tool at a point in original-image pixels (`eraser@120,48`).
    Point { tool: Tool, x: u32, y: u32 },
}

impl SelectionEvent {
    pub fn apply(self, selection: Selection, pass: &DetectionPass) -> Result<Selection> {
        match self {
            SelectionEvent::SelectAll => Ok(selection.select_all()),
            SelectionEvent::SelectNone => Ok(selection.select_none()),
            SelectionEvent::Face { tool, id } => selection.toggle(id, tool),
            SelectionEvent::Point { tool, x, y } => selection.apply_tool_at(pass, x, y, tool),
        }
    }
}

impl fmt::Display for SelectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionEvent::SelectAll => f.write_str("all"),
            SelectionEvent::SelectNone => f.write_str("none"),
            SelectionEvent::Face { tool, id } => write!(f, "{tool}:{id}"),
            SelectionEvent::Point { tool, x, y } => write!(f, "{tool}@{x},{y}"),
        }
    }
}

impl FromStr for SelectionEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "all" => return Ok(SelectionEvent::SelectAll),
            "none" => return Ok(SelectionEvent::SelectNone),
            _ => {}
        }

        if let Some((tool, point)) = value.split_once('@') {
            let tool: Tool = tool.parse()?;
            let (x, y) = point
                .split_once(',')
                .ok_or_else(|| format!("invalid point '{point}'; expected 'x,y'"))?;
            let parse = |v: &str| {
                v.trim()
                    .parse::<u32>()
                    .map_err(|_| format!("invalid coordinate '{v}' in event '{value}'"))
            };
            return Ok(SelectionEvent::Point {
                tool,
                x: parse(x)?,
                y: parse(y)?,
            });
        }

        if let Some((tool, id)) = value.split_once(':') {
            let tool: Tool = tool.parse()?;
            let id = id
                .trim()
                .parse::<FaceId>()
                .map_err(|_| format!("invalid face id '{id}' in event '{value}'"))?;
            return Ok(SelectionEvent::Face { tool, id });
        }

        Err(format!(
            "invalid selection event '{value}'; expected all, none, <tool>:<id> or <tool>@<x>,<y>"
        ))
    }
}

/// Fold `events` over a fresh all-selected state for `pass`.
pub fn replay<'a>(
    pass: &DetectionPass,
    events: impl IntoIterator<Item = &'a SelectionEvent>,
) -> Result<Selection> {
    events
        .into_iter()
        .try_fold(Selection::new(pass), |selection, event| {
            event.apply(selection, pass)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{FaceBox, FaceCandidate};

    fn pass() -> DetectionPass {
        // Face 0 is large and contains face 2; face 1 sits on its own.
        DetectionPass::from_candidates(
            (640, 480),
            vec![
                FaceCandidate {
                    bbox: FaceBox::new(400, 300, 440, 340).unwrap(),
                    confidence: 0.8,
                },
                FaceCandidate {
                    bbox: FaceBox::new(50, 50, 250, 250).unwrap(),
                    confidence: 0.9,
                },
                FaceCandidate {
                    bbox: FaceBox::new(100, 100, 120, 120).unwrap(),
                    confidence: 0.7,
                },
            ],
        )
    }

    #[test]
    fn starts_with_everything_selected() {
        let pass = pass();
        let selection = Selection::new(&pass);
        assert_eq!(selection.selected_ids(), vec![0, 1, 2]);
        assert_eq!(selection.len(), pass.len());
    }

    #[test]
    fn bulk_operations_are_complementary_and_idempotent() {
        let pass = pass();
        let none = Selection::new(&pass).select_none();
        assert!(none.state().values().all(|selected| !selected));
        assert_eq!(none.clone().select_none(), none);

        let all = none.select_all();
        assert!(all.state().values().all(|selected| *selected));
        assert_eq!(all.clone().select_all(), all);
    }

    #[test]
    fn pen_and_eraser_are_idempotent() {
        let pass = pass();
        let once = Selection::new(&pass).toggle(1, Tool::Eraser).unwrap();
        let twice = once.clone().toggle(1, Tool::Eraser).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.is_selected(1), Some(false));

        let pen_once = once.toggle(1, Tool::Pen).unwrap();
        let pen_twice = pen_once.clone().toggle(1, Tool::Pen).unwrap();
        assert_eq!(pen_once, pen_twice);
        assert_eq!(pen_once.is_selected(1), Some(true));
    }

    #[test]
    fn unknown_face_is_rejected() {
        let pass = pass();
        let err = Selection::new(&pass).toggle(7, Tool::Pen).unwrap_err();
        assert!(matches!(err, MaskError::UnknownFace(7)));
        assert!(matches!(
            Selection::from_ids(&pass, [0, 9]),
            Err(MaskError::UnknownFace(9))
        ));
    }

    #[test]
    fn hit_test_prefers_larger_face_and_is_inclusive() {
        let pass = pass();
        assert_eq!(hit_test(pass.faces(), 110, 110), Some(0));
        assert_eq!(hit_test(pass.faces(), 440, 340), Some(1));
        assert_eq!(hit_test(pass.faces(), 50, 50), Some(0));
        assert_eq!(hit_test(pass.faces(), 600, 20), None);
    }

    #[test]
    fn clicking_applies_the_active_tool() {
        let pass = pass();
        let selection = Selection::new(&pass)
            .apply_tool_at(&pass, 420, 320, Tool::Eraser)
            .unwrap();
        assert_eq!(selection.selected_ids(), vec![0, 2]);

        let unchanged = selection
            .clone()
            .apply_tool_at(&pass, 5, 470, Tool::Eraser)
            .unwrap();
        assert_eq!(unchanged, selection);
    }

    #[test]
    fn selection_from_another_pass_is_stale() {
        let first = pass();
        let second = pass();
        let selection = Selection::new(&first);
        let err = selection
            .apply_tool_at(&second, 100, 100, Tool::Pen)
            .unwrap_err();
        assert!(matches!(err, MaskError::StaleSession(_)));
    }

    #[test]
    fn events_parse_and_replay() {
        let events: Vec<SelectionEvent> = ["none", "pen:2", "pen@420,320", "eraser:2", "all", "eraser@60,60"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(
            events[2],
            SelectionEvent::Point {
                tool: Tool::Pen,
                x: 420,
                y: 320
            }
        );
        assert_eq!(events[3].to_string(), "eraser:2");

        let pass = pass();
        let selection = replay(&pass, &events).unwrap();
        assert_eq!(selection.selected_ids(), vec![1, 2]);

        let partial = replay(&pass, &events[..3]).unwrap();
        assert_eq!(partial.selected_ids(), vec![1, 2]);

        assert!("pen".parse::<SelectionEvent>().is_err());
        assert!("brush:1".parse::<SelectionEvent>().is_err());
        assert!("pen@1".parse::<SelectionEvent>().is_err());
    }

    #[test]
    fn viewport_maps_display_points_back() {
        let viewport = Viewport::fit((1280, 720), (640, 480));
        assert_eq!(viewport.scale_x, 0.5);
        assert_eq!(viewport.offset_y, 60.0);
        assert_eq!(viewport.to_original(320.0, 240.0), Some((640, 360)));
        assert_eq!(viewport.to_original(10.0, 10.0), None);

        let tall = Viewport::fit((100, 200), (300, 300));
        assert_eq!(tall.offset_x, 75.0);
        assert_eq!(tall.to_original(75.0, 0.0), Some((0, 0)));
    }

    #[test]
    fn viewport_far_edge_is_outside_the_image() {
        let viewport = Viewport::fit((1280, 720), (640, 480));
        assert_eq!(viewport.to_original(640.0, 240.0), None);
        assert_eq!(viewport.to_original(320.0, 420.0), None);
        assert_eq!(viewport.to_original(639.9, 419.9), Some((1279, 719)));
    }
}
