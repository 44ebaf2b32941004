//! Field markings the calibration fits against.
//!
//! Coordinates are millimetres with the origin at the field centre, x along
//! the field length. All markings lie in the `z = 0` plane.

use std::f64::consts::PI;

use fieldcal_core::{Pt2, Pt3, Real, SegmentShape};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLine {
    pub name: String,
    pub p1: Pt2,
    pub p2: Pt2,
    pub thickness: Real,
}

impl FieldLine {
    pub fn new(name: &str, p1: (Real, Real), p2: (Real, Real), thickness: Real) -> Self {
        Self {
            name: name.to_string(),
            p1: Pt2::new(p1.0, p1.1),
            p2: Pt2::new(p2.0, p2.1),
            thickness,
        }
    }

    pub fn segment(&self) -> SegmentShape {
        SegmentShape::Straight {
            p1: Pt3::new(self.p1.x, self.p1.y, 0.0),
            p2: Pt3::new(self.p2.x, self.p2.y, 0.0),
        }
    }
}

/// Arc from angle `a1` to `a2` (radians, counter-clockwise from +x).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCircularArc {
    pub name: String,
    pub center: Pt2,
    pub radius: Real,
    pub a1: Real,
    pub a2: Real,
    pub thickness: Real,
}

impl FieldCircularArc {
    pub fn new(
        name: &str,
        center: (Real, Real),
        radius: Real,
        a1: Real,
        a2: Real,
        thickness: Real,
    ) -> Self {
        Self {
            name: name.to_string(),
            center: Pt2::new(center.0, center.1),
            radius,
            a1,
            a2,
            thickness,
        }
    }

    pub fn segment(&self) -> SegmentShape {
        SegmentShape::Arc {
            center: Pt3::new(self.center.x, self.center.y, 0.0),
            radius: self.radius,
            theta1: self.a1,
            theta2: self.a2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub field_length: Real,
    pub field_width: Real,
    pub boundary_width: Real,
    pub lines: Vec<FieldLine>,
    pub arcs: Vec<FieldCircularArc>,
}

impl Default for FieldGeometry {
    /// Marking set of the 13.4 m x 9 m double-size field.
    fn default() -> Self {
        let t = 10.0;
        let lines = vec![
            FieldLine::new("TopTouchLine", (-6710.0, 4495.0), (6710.0, 4495.0), t),
            FieldLine::new("BottomTouchLine", (-6710.0, -4495.0), (6710.0, -4495.0), t),
            FieldLine::new("LeftGoalLine", (-6705.0, -4490.0), (-6705.0, 4490.0), t),
            FieldLine::new("RightGoalLine", (6705.0, -4490.0), (6705.0, 4490.0), t),
            FieldLine::new("HalfwayLine", (0.0, -4490.0), (0.0, 4490.0), t),
            FieldLine::new("CenterLine", (-6710.0, 0.0), (6710.0, 0.0), t),
            FieldLine::new("LeftPenaltyStretch", (-5715.0, -250.0), (-5715.0, 250.0), t),
            FieldLine::new("RightPenaltyStretch", (5715.0, -250.0), (5715.0, 250.0), t),
            FieldLine::new("LeftQuarterLine", (-3710.0, -4490.0), (-3710.0, 4490.0), t),
            FieldLine::new("RightQuarterLine", (3710.0, -4490.0), (3710.0, 4490.0), t),
            FieldLine::new("LeftNearHalfLine", (-715.0, -4490.0), (-715.0, 4490.0), t),
            FieldLine::new("RightNearHalfLine", (715.0, -4490.0), (715.0, 4490.0), t),
        ];
        let arcs = vec![
            FieldCircularArc::new("LeftFieldLeftPenaltyArc", (-6710.0, 250.0), 995.0, 0.0, 0.5 * PI, t),
            FieldCircularArc::new(
                "LeftFieldRightPenaltyArc",
                (-6710.0, -250.0),
                995.0,
                1.5 * PI,
                2.0 * PI,
                t,
            ),
            FieldCircularArc::new("RightFieldLeftPenaltyArc", (6710.0, -250.0), 995.0, PI, 1.5 * PI, t),
            FieldCircularArc::new("RightFieldRightPenaltyArc", (6710.0, 250.0), 995.0, 0.5 * PI, PI, t),
            FieldCircularArc::new("CenterCircle", (0.0, 0.0), 495.0, 0.0, 2.0 * PI, t),
            FieldCircularArc::new("LeftCircle", (-3710.0, 0.0), 495.0, 0.0, 2.0 * PI, t),
            FieldCircularArc::new("RightCircle", (3710.0, 0.0), 495.0, 0.0, 2.0 * PI, t),
        ];
        Self {
            field_length: 13420.0,
            field_width: 8990.0,
            boundary_width: 250.0,
            lines,
            arcs,
        }
    }
}

impl FieldGeometry {
    /// Plain rectangle with touch, goal, halfway and centre lines, plus a
    /// centre circle when `center_radius > 0`.
    pub fn rectangle(field_length: Real, field_width: Real, center_radius: Real) -> Self {
        let (hx, hy) = (0.5 * field_length, 0.5 * field_width);
        let t = 10.0;
        let lines = vec![
            FieldLine::new("TopTouchLine", (-hx, hy), (hx, hy), t),
            FieldLine::new("BottomTouchLine", (-hx, -hy), (hx, -hy), t),
            FieldLine::new("LeftGoalLine", (-hx, -hy), (-hx, hy), t),
            FieldLine::new("RightGoalLine", (hx, -hy), (hx, hy), t),
            FieldLine::new("HalfwayLine", (0.0, -hy), (0.0, hy), t),
            FieldLine::new("CenterLine", (-hx, 0.0), (hx, 0.0), t),
        ];
        let arcs = if center_radius > 0.0 {
            vec![FieldCircularArc::new(
                "CenterCircle",
                (0.0, 0.0),
                center_radius,
                0.0,
                2.0 * PI,
                t,
            )]
        } else {
            Vec::new()
        };
        Self {
            field_length,
            field_width,
            boundary_width: 250.0,
            lines,
            arcs,
        }
    }

    pub fn line(&self, name: &str) -> Option<&FieldLine> {
        self.lines.iter().find(|l| l.name == name)
    }

    /// Every marking as a calibration segment, lines first.
    pub fn calibration_segments(&self) -> Vec<SegmentShape> {
        self.lines
            .iter()
            .map(FieldLine::segment)
            .chain(self.arcs.iter().map(FieldCircularArc::segment))
            .collect()
    }
}
