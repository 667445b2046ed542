use depthgrasp::{
    DepthImageBuffer, GraspPlanner, GripperSpec, ModelError, ModelOutput, ModelSpec, OrthographicImage,
    SelectionMethod, WorkspaceBoundary,
};
use image::Rgba;
use ndarray::{s, Array4, ArrayView4};

const PIXEL_SIZE: f64 = 1000.0;
const DOME: [f64; 2] = [0.02, -0.015];

/// 160 x 160 mm table at 0.5 m with a dome rising to 0.4 m.
fn dome_scene() -> OrthographicImage {
    let mut img = OrthographicImage::new(DepthImageBuffer::new(160, 160), PIXEL_SIZE, 0.2, 0.6).unwrap();
    for row in 0..160u32 {
        for col in 0..160u32 {
            let [x, y] = img.unproject([col as f64 + 0.5, row as f64 + 0.5]);
            let r = (x - DOME[0]).hypot(y - DOME[1]);
            let depth = if r < 0.03 { 0.4 + 20.0 * r * r } else { 0.5 };
            let v = img.value_from_depth(depth) as u16;
            img.mat_mut().put_pixel(col, row, Rgba([v, v, v, v]));
        }
    }
    img
}

fn model_spec() -> ModelSpec {
    ModelSpec {
        size_area_cropped: [100.0, 100.0],
        size_result: [25.0, 25.0],
        strokes: vec![0.02, 0.04, 0.06],
        ..ModelSpec::default()
    }
}

fn planner() -> GraspPlanner {
    let mut planner = GraspPlanner::new(model_spec()).unwrap();
    planner.config_mut().sampler.orientations = 4;
    planner
}

/// Scores each 2 x 2 block of a view by its height; wider strokes score lower.
fn height_reward(views: ArrayView4<'_, f32>, strokes: usize) -> Array4<f32> {
    let (n, h, w, c) = views.dim();
    Array4::from_shape_fn((n, h / 2, w / 2, strokes), |(k, r, col, stroke)| {
        let block = views.slice(s![k, 2 * r..2 * r + 2, 2 * col..2 * col + 2, c - 1]);
        block.mean().unwrap_or(0.0) * (1.0 - 0.1 * stroke as f32)
    })
}

#[test]
fn grasps_the_top_of_the_dome() {
    let image = dome_scene();
    let mut calls = 0;
    let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, ModelError> {
        calls += 1;
        Ok(ModelOutput::reward_only(height_reward(views, 3)))
    };
    let gripper = GripperSpec::new(0.03, 0.1);

    let grasp = planner()
        .find_safe_grasp(&image, &mut model, SelectionMethod::Max, None, Some(&gripper))
        .unwrap()
        .expect("dome should be graspable");

    assert_eq!(calls, 1);
    assert_eq!(grasp.stroke_index, 1);
    assert_eq!(grasp.method, "Max");
    assert!((grasp.pose.x - DOME[0]).hypot(grasp.pose.y - DOME[1]) < 0.01);
    assert!(grasp.pose.z > 0.35 && grasp.pose.z < 0.41, "z = {}", grasp.pose.z);
    assert!(grasp.timings.inference_s >= 0.0);
}

#[test]
fn boundary_keeps_grasp_inside_the_bin() {
    let image = dome_scene();
    let bin = WorkspaceBoundary::from_center_size([-0.045, 0.04, 0.0], [0.05, 0.06, 0.0]);
    let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::reward_only(height_reward(views, 3)))
    };

    let grasp = planner()
        .find_safe_grasp(&image, &mut model, SelectionMethod::Max, Some(&bin), None)
        .unwrap()
        .expect("bin interior should be graspable");

    assert!(bin.contains_jaws(&grasp.pose, grasp.stroke, 0.002));
    // Flat table, possibly capped by the dome next to the bin.
    assert!(grasp.pose.z > 0.36 && grasp.pose.z < 0.471, "z = {}", grasp.pose.z);
}

#[test]
fn action_head_depth_is_floored_by_the_scene() {
    let image = dome_scene();
    let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, ModelError> {
        let reward = height_reward(views, 3);
        let (n, r, c, _) = reward.dim();
        let mut action = Array4::zeros((n, r, c, 3));
        action.slice_mut(s![.., .., .., 0]).fill(0.45);
        action.slice_mut(s![.., .., .., 1]).fill(0.1);
        Ok(ModelOutput::with_action(reward, action))
    };

    let grasp = planner()
        .find_safe_grasp(&image, &mut model, SelectionMethod::Max, None, None)
        .unwrap()
        .expect("dome should be graspable");

    assert!(grasp.pose.z < 0.45);
    assert!((grasp.pose.b - 0.1).abs() < 1e-6);
    assert_eq!(grasp.model_action.map(|a| a[0]), Some(0.45));
}

#[test]
fn nothing_measurable_means_no_grasp() {
    let image = OrthographicImage::new(DepthImageBuffer::new(80, 80), PIXEL_SIZE, 0.2, 0.6).unwrap();
    let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::reward_only(Array4::from_elem((views.dim().0, 3, 3, 3), 0.5)))
    };
    let mut planner = planner();
    planner.config_mut().generator.seed = Some(11);

    for method in [SelectionMethod::Max, SelectionMethod::Top { n: 4 }, SelectionMethod::Random] {
        let grasp = planner
            .find_safe_grasp(&image, &mut model, method, None, None)
            .unwrap();
        assert!(grasp.is_none());
    }
}

#[test]
fn candidate_stream_can_be_dropped_early() {
    let image = dome_scene();
    let mut model = |views: ArrayView4<'_, f32>| -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::reward_only(height_reward(views, 3)))
    };
    let planner = planner();
    let mut stream = planner
        .generate_candidates(&image, &mut model, SelectionMethod::Top { n: 5 }, None, None)
        .unwrap();
    let total = stream.remaining();
    let first: Vec<_> = stream.by_ref().take(3).collect();
    assert_eq!(first.len(), 3);
    assert_eq!(stream.remaining(), total - 3);
    assert!(first.iter().all(|c| c.pose.z.is_nan()));

    let refined = planner.refine(&image, first[0].clone());
    assert!(refined.pose.z.is_finite());
}
