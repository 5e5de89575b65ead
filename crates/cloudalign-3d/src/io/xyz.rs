use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Error types for the XYZ module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum XyzError {
    /// Failed to read or write an XYZ file
    #[error("Failed to access XYZ file")]
    Io(#[from] std::io::Error),
}

/// Read a plain-text XYZ point cloud file.
///
/// One point per line as three whitespace-separated decimal numbers. Lines
/// starting with `#` and blank lines are ignored. Malformed lines are
/// silently skipped.
///
/// # Arguments
/// * `path` - Path to an `.xyz` text file.
///
/// # Returns
/// The points contained in the file, in file order.
pub fn read_xyz(path: impl AsRef<Path>) -> Result<Vec<[f64; 3]>, XyzError> {
    let file = File::open(path)?;
    read_xyz_from(BufReader::new(file))
}

/// Read XYZ-formatted points from any buffered reader.
pub fn read_xyz_from<R: BufRead>(reader: R) -> Result<Vec<[f64; 3]>, XyzError> {
    let mut points = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(x), Some(y), Some(z)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        let (Ok(x), Ok(y), Ok(z)) = (x.parse(), y.parse(), z.parse()) else {
            continue;
        };
        points.push([x, y, z]);
    }
    Ok(points)
}

/// Write a point cloud as a plain-text XYZ file.
///
/// The output starts with a `# x y z` header line followed by one point per
/// line in fixed-point notation with six decimals.
///
/// # Arguments
/// * `path` - Destination path.
/// * `points` - The points to write.
pub fn write_xyz(path: impl AsRef<Path>, points: &[[f64; 3]]) -> Result<(), XyzError> {
    let file = File::create(path)?;
    write_xyz_to(BufWriter::new(file), points)
}

/// Write XYZ-formatted points to any writer.
pub fn write_xyz_to<W: Write>(mut writer: W, points: &[[f64; 3]]) -> Result<(), XyzError> {
    writeln!(writer, "# x y z")?;
    for p in points {
        writeln!(writer, "{:.6} {:.6} {:.6}", p[0], p[1], p[2])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn reads_points_and_skips_comments() -> Result<(), XyzError> {
        let data = "# a comment\n0.0 0.0 0.0\n\n3.0 0.0 0.0\n# another\n0.0 2.0 0.0\n";
        let points = read_xyz_from(Cursor::new(data))?;
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], [3.0, 0.0, 0.0]);
        assert_eq!(points[2], [0.0, 2.0, 0.0]);
        Ok(())
    }

    #[test]
    fn skips_malformed_lines() -> Result<(), XyzError> {
        let data = "1.0 2.0\nnot a point\n1.0 2.0 3.0\n4.0 five 6.0\n";
        let points = read_xyz_from(Cursor::new(data))?;
        assert_eq!(points, vec![[1.0, 2.0, 3.0]]);
        Ok(())
    }

    #[test]
    fn accepts_trailing_fields() -> Result<(), XyzError> {
        let data = "1.0 2.0 3.0 255 255 255\n";
        let points = read_xyz_from(Cursor::new(data))?;
        assert_eq!(points, vec![[1.0, 2.0, 3.0]]);
        Ok(())
    }

    #[test]
    fn writes_header_and_fixed_point() -> Result<(), XyzError> {
        let mut buf = Vec::new();
        write_xyz_to(&mut buf, &[[1.5, -2.0, 0.125]])?;
        let text = String::from_utf8(buf).expect("utf-8 output");
        assert_eq!(text, "# x y z\n1.500000 -2.000000 0.125000\n");
        Ok(())
    }

    #[test]
    fn roundtrip_preserves_six_decimals() -> Result<(), XyzError> {
        let original = vec![
            [1.5, 2.5, 3.5],
            [-1.0, 0.0, 1.0],
            [0.123456, -0.654321, 9.999999],
        ];
        let mut buf = Vec::new();
        write_xyz_to(&mut buf, &original)?;
        let restored = read_xyz_from(Cursor::new(buf))?;

        assert_eq!(restored.len(), original.len());
        for (r, o) in restored.iter().zip(original.iter()) {
            for (a, b) in r.iter().zip(o.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn roundtrip_through_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let file_path = temp_dir.path().join("cloud.xyz");

        let original = vec![[0.5, 1.5, 2.0], [3.0, 0.0, 4.0]];
        write_xyz(&file_path, &original)?;
        let restored = read_xyz(&file_path)?;

        assert_eq!(restored.len(), original.len());
        for (r, o) in restored.iter().zip(original.iter()) {
            for (a, b) in r.iter().zip(o.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = read_xyz("/nonexistent/cloud.xyz");
        assert!(matches!(result, Err(XyzError::Io(_))));
    }
}
