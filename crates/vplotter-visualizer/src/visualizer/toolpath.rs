//! Plotted toolpath
//!
//! Resolves the `Unchanged` axes of a program's motion instructions by
//! carrying the previous point forward. The instructions themselves are
//! left untouched.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gcode::{GcodeProgram, MotionInstruction, MotionType};

/// How the plotter reached a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    /// Implicit origin the path starts from
    Start,
    /// Reached by a G0 move
    Rapid,
    /// Reached by a G1 move
    Linear,
}

impl From<MotionType> for PointKind {
    fn from(motion: MotionType) -> Self {
        match motion {
            MotionType::Rapid => PointKind::Rapid,
            MotionType::Linear => PointKind::Linear,
        }
    }
}

/// One resolved point of the plot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    /// X coordinate (mm)
    pub x: f64,
    /// Y coordinate (mm)
    pub y: f64,
    /// Move that reached this point
    pub kind: PointKind,
}

/// Axis-aligned extent of a toolpath
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Blank border around an SVG drawing (mm)
const SVG_MARGIN: f64 = 5.0;

/// Forward-filled sequence of plot points
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Toolpath {
    points: Vec<PlotPoint>,
}

impl Toolpath {
    /// Build the toolpath for a sequence of motion instructions.
    ///
    /// The path always starts at (0, 0).
    pub fn from_instructions(instructions: &[MotionInstruction]) -> Self {
        let mut points = Vec::with_capacity(instructions.len() + 1);
        let mut current = PlotPoint {
            x: 0.0,
            y: 0.0,
            kind: PointKind::Start,
        };
        points.push(current);

        for inst in instructions {
            current = PlotPoint {
                x: inst.x.resolve(current.x),
                y: inst.y.resolve(current.y),
                kind: inst.motion_type.into(),
            };
            points.push(current);
        }

        Self { points }
    }

    /// Build the toolpath for a whole program
    pub fn from_program(program: &GcodeProgram) -> Self {
        Self::from_instructions(program.instructions())
    }

    pub fn points(&self) -> &[PlotPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Extent of all points, `None` for an empty path
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.points.first()?;
        let init = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(self.points.iter().fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }

    /// Total length of the moves of one kind (mm)
    pub fn travel(&self, kind: PointKind) -> f64 {
        self.points
            .windows(2)
            .filter(|pair| pair[1].kind == kind)
            .map(|pair| (pair[1].x - pair[0].x).hypot(pair[1].y - pair[0].y))
            .sum()
    }

    /// SVG path data for the segments reached by moves of `kind`.
    ///
    /// Y is negated so the plot reads with +Y up.
    pub fn svg_path(&self, kind: PointKind) -> String {
        let mut path = String::with_capacity(self.points.len() * 16);
        let mut pen: Option<(f64, f64)> = None;

        for pair in self.points.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if to.kind != kind {
                pen = None;
                continue;
            }
            if pen != Some((from.x, from.y)) {
                let _ = write!(path, "M {:.2} {:.2} ", from.x, -from.y);
            }
            let _ = write!(path, "L {:.2} {:.2} ", to.x, -to.y);
            pen = Some((to.x, to.y));
        }

        debug!("Built {:?} SVG path of {} bytes", kind, path.len());
        path.trim_end().to_string()
    }

    /// Standalone SVG drawing with rapids dashed and linear moves solid
    pub fn svg_document(&self) -> String {
        let b = self.bounds().unwrap_or(Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        });
        format!(
            concat!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"{:.2} {:.2} {:.2} {:.2}\">\n",
                "  <path d=\"{}\" fill=\"none\" stroke=\"gray\" stroke-width=\"0.2\" stroke-dasharray=\"1 1\"/>\n",
                "  <path d=\"{}\" fill=\"none\" stroke=\"black\" stroke-width=\"0.3\"/>\n",
                "</svg>\n"
            ),
            b.min_x - SVG_MARGIN,
            -b.max_y - SVG_MARGIN,
            b.width() + 2.0 * SVG_MARGIN,
            b.height() + 2.0 * SVG_MARGIN,
            self.svg_path(PointKind::Rapid),
            self.svg_path(PointKind::Linear),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(path: &Toolpath) -> Vec<(f64, f64)> {
        path.points().iter().map(|p| (p.x, p.y)).collect()
    }

    #[test]
    fn test_forward_fill() {
        let program = GcodeProgram::parse("G0 X1\nG1 Y2");
        let path = Toolpath::from_program(&program);

        assert_eq!(xy(&path), vec![(0.0, 0.0), (1.0, 0.0), (1.0, 2.0)]);
        let kinds: Vec<PointKind> = path.points().iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PointKind::Start, PointKind::Rapid, PointKind::Linear]
        );

        // The instructions still record the missing axes as unchanged.
        assert!(!program.instructions()[0].y.is_present());
        assert!(!program.instructions()[1].x.is_present());
    }

    #[test]
    fn test_empty_program_plots_origin_only() {
        let path = Toolpath::from_program(&GcodeProgram::parse("G90\nM05"));
        assert_eq!(xy(&path), vec![(0.0, 0.0)]);
    }

    #[test]
    fn test_bounds_and_travel() {
        let program = GcodeProgram::parse("G0 X10\nG1 Y-5\nG1 X-2");
        let path = Toolpath::from_program(&program);

        let bounds = path.bounds().unwrap();
        assert_eq!((bounds.min_x, bounds.max_x), (-2.0, 10.0));
        assert_eq!((bounds.min_y, bounds.max_y), (-5.0, 0.0));
        assert_eq!(bounds.width(), 12.0);

        assert_eq!(path.travel(PointKind::Rapid), 10.0);
        assert_eq!(path.travel(PointKind::Linear), 17.0);
    }

    #[test]
    fn test_svg_paths_split_by_kind() {
        let program = GcodeProgram::parse("G0 X1\nG1 Y2\nG1 X3");
        let path = Toolpath::from_program(&program);

        assert_eq!(path.svg_path(PointKind::Rapid), "M 0.00 -0.00 L 1.00 -0.00");
        assert_eq!(
            path.svg_path(PointKind::Linear),
            "M 1.00 -0.00 L 1.00 -2.00 L 3.00 -2.00"
        );
    }

    #[test]
    fn test_svg_document_frames_the_plot() {
        let program = GcodeProgram::parse("G0 X10\nG1 Y20");
        let doc = Toolpath::from_program(&program).svg_document();

        assert!(doc.starts_with("<svg "));
        assert!(doc.contains("viewBox=\"-5.00 -25.00 20.00 30.00\""));
        assert!(doc.contains("d=\"M 10.00 -0.00 L 10.00 -20.00\""));
        assert!(doc.trim_end().ends_with("</svg>"));
    }
}
