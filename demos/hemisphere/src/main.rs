use argh::FromArgs;
use std::path::PathBuf;

use cloudalign_3d::io::xyz::write_xyz;
use cloudalign_3d::linalg::mat33_mul_vec3;
use cloudalign_3d::pointcloud::PointCloud;
use cloudalign_3d::transforms::axis_angle_to_rotation_matrix;
use cloudalign_icp::{icp, icp_with_observer, ICPMethod, ICPResult, ICPSettings};

#[derive(FromArgs)]
/// Register a synthetic hemisphere cloud with all three ICP variants
struct Args {
    /// directory to save the source and target clouds as xyz text files
    #[argh(option, short = 's')]
    save_dir: Option<PathBuf>,

    /// print the error of every iteration
    #[argh(switch, short = 'i')]
    show_iterations: bool,
}

fn make_hemisphere(radius: f64, n: usize) -> Vec<[f64; 3]> {
    let mut points = Vec::new();
    for i in 0..=n {
        let phi = std::f64::consts::FRAC_PI_2 * i as f64 / n as f64;
        let n_theta = ((n as f64 * phi.sin()) as usize).max(1);
        for j in 0..n_theta {
            let theta = 2.0 * std::f64::consts::PI * j as f64 / n_theta as f64;
            points.push([
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ]);
        }
    }
    points
}

fn print_result(name: &str, result: &ICPResult) {
    println!("=== {name} ===");
    println!("  Iterations: {}", result.iterations);
    println!("  Error:      {:.2e}", result.error);
    println!("  Rotation:");
    for row in &result.rotation {
        println!("    [{:8.5} {:8.5} {:8.5}]", row[0], row[1], row[2]);
    }
    println!(
        "  Translation: [{:.5}, {:.5}, {:.5}]\n",
        result.translation[0], result.translation[1], result.translation[2]
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let target = make_hemisphere(2.0, 10);
    println!("Generated {} points on a hemisphere\n", target.len());

    // apply a known transform: 15-degree rotation around Z + translation
    let angle = std::f64::consts::PI / 12.0;
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], angle)?;
    let translation = [0.3, 0.2, 0.1];

    // p_src = R^T * (p_tgt - t), so the ground truth is exactly (R, t)
    let source = target
        .iter()
        .map(|p| {
            let shifted = [
                p[0] - translation[0],
                p[1] - translation[1],
                p[2] - translation[2],
            ];
            let r_t = [
                [rotation[0][0], rotation[1][0], rotation[2][0]],
                [rotation[0][1], rotation[1][1], rotation[2][1]],
                [rotation[0][2], rotation[1][2], rotation[2][2]],
            ];
            let mut out = [0.0; 3];
            mat33_mul_vec3(&r_t, &shifted, &mut out);
            out
        })
        .collect::<Vec<_>>();

    println!("Ground truth:");
    println!("  Rotation:    {:.1} deg around Z", angle.to_degrees());
    println!(
        "  Translation: [{:.3}, {:.3}, {:.3}]\n",
        translation[0], translation[1], translation[2]
    );

    if let Some(dir) = &args.save_dir {
        std::fs::create_dir_all(dir)?;
        write_xyz(dir.join("source.xyz"), &source)?;
        write_xyz(dir.join("target.xyz"), &target)?;
        println!("Saved clouds to {}\n", dir.display());
    }

    let source = PointCloud::from_points(source);
    let target = PointCloud::from_points(target);

    for (name, method) in [
        ("Point-to-Point", ICPMethod::PointToPoint),
        ("Point-to-Plane", ICPMethod::PointToPlane),
        ("Plane-to-Plane", ICPMethod::PlaneToPlane),
    ] {
        let settings = ICPSettings {
            method,
            max_iterations: 100,
            ..Default::default()
        };

        let result = if args.show_iterations {
            icp_with_observer(&source, &target, &settings, &mut |snapshot| {
                println!(
                    "  [{name}] iteration {:3}: error {:.3e}",
                    snapshot.iteration, snapshot.error
                );
            })?
        } else {
            icp(&source, &target, &settings)?
        };

        print_result(name, &result);
    }

    Ok(())
}
