use celline::{AppConfig, Camera, DirectionalLight, Mesh, Model, SHADER_DIR_ENV, Scene, Vec3};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::new().title("Toonify").size(800, 600);
    if let Some(dir) = std::env::var_os(SHADER_DIR_ENV) {
        config = config.shader_dir(dir);
    }

    // cube | sphere | torus
    let model = std::env::args().nth(1).unwrap_or_else(|| "torus".to_string());

    let result = celline::run(config, move |gpu| {
        let mesh = match model.as_str() {
            "cube" => Mesh::cube(gpu),
            "sphere" => Mesh::sphere(gpu, 48, 24),
            "torus" => Mesh::torus(gpu, 1.5, 0.5),
            other => {
                log::warn!("Unknown model '{other}', using torus");
                Mesh::torus(gpu, 1.5, 0.5)
            }
        };

        let camera = Camera::new()
            .at(5.0, 5.0, 5.0)
            .looking_at(0.0, 0.0, 0.0)
            .with_up(Vec3::Y)
            .with_fov(67.0)
            .with_clip(1.0, 1000.0);

        Ok(Scene::new(camera, Model::new(mesh).with_color(0.9, 0.45, 0.2))
            .with_light(DirectionalLight::new(0.8, 0.8, 0.8, -0.5, -1.0, -0.8)))
    });

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
