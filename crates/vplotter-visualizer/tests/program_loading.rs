//! Integration tests for program loading and plotting

use proptest::prelude::*;
use std::io::Write;
use vplotter_visualizer::{AxisWord, GcodeProgram, MotionType, PointKind, Toolpath};

#[test]
fn test_load_file_cleans_every_line() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "; plotter test square").unwrap();
    writeln!(file, "g90").unwrap();
    writeln!(file, "G0 X10 Y10").unwrap();
    writeln!(file, "G1 X20 ; right").unwrap();
    writeln!(file, "G1 Y20").unwrap();
    file.flush().unwrap();

    let program = GcodeProgram::load_file(file.path()).unwrap();
    assert_eq!(program.lines(), &["", "G90", "G0 X10 Y10", "G1 X20", "G1 Y20"]);
    assert_eq!(program.instructions().len(), 3);

    let second = program.instructions()[1];
    assert_eq!(second.motion_type, MotionType::Linear);
    assert_eq!(second.x, AxisWord::Present(20.0));
    assert_eq!(second.y, AxisWord::Unchanged);
    assert_eq!(second.line_number, 4);
}

#[test]
fn test_load_missing_file_is_gcode_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = GcodeProgram::load_file(dir.path().join("missing.gcode")).unwrap_err();
    assert!(matches!(err, vplotter_core::Error::Gcode(_)));
    assert!(err.to_string().contains("missing.gcode"));
}

#[test]
fn test_plot_square_returns_to_start() {
    let program =
        GcodeProgram::parse("G0 X10 Y10\nG1 X20\nG1 Y20\nG1 X10\nG1 Y10\n");
    let path = Toolpath::from_program(&program);

    let last = path.points().last().unwrap();
    assert_eq!((last.x, last.y), (10.0, 10.0));
    assert_eq!(path.points()[1].kind, PointKind::Rapid);
    assert_eq!(path.travel(PointKind::Linear), 40.0);

    let bounds = path.bounds().unwrap();
    assert_eq!((bounds.width(), bounds.height()), (20.0, 20.0));
}

proptest! {
    #[test]
    fn prop_one_cleaned_line_per_source_line(lines in prop::collection::vec("[ -~]{0,40}", 0..30)) {
        let text = lines.join("\n");
        let program = GcodeProgram::parse(&text);
        prop_assert_eq!(program.len(), text.lines().count());
        for line in program.lines() {
            prop_assert!(!line.contains(';'));
            prop_assert_eq!(line.trim(), line.as_str());
        }
    }

    #[test]
    fn prop_toolpath_has_one_point_per_instruction(xs in prop::collection::vec(-500.0f64..500.0, 1..20)) {
        let text: Vec<String> = xs.iter().map(|x| format!("G1 X{:.3}", x)).collect();
        let program = GcodeProgram::parse(&text.join("\n"));
        let path = Toolpath::from_program(&program);
        prop_assert_eq!(path.len(), program.instructions().len() + 1);
        prop_assert!(path.points().iter().skip(1).all(|p| p.y == 0.0));
    }
}
