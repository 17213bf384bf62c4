// vk_rmain.rs — the renderer driver
//
// Owns the world, the caches, and the GPU objects, and sequences one
// frame: visibility walk, dynamic lights, reflection passes, the draw
// phases, then the post chain. Subsystems hand their errors up; only
// this module decides between retry, fallback, and abort.

use q2vk_common::cvar::{CvarContext, CvarHandle};
use q2vk_common::files::FileLoader;
use q2vk_common::q_shared::{
    dot_product, signbits_for_plane, vector_subtract, RefDef, Vec3, VidDef, CVAR_ARCHIVE,
    CVAR_LATCH, PARTICLE_CLASSES, PLANE_ANYZ, RDF_NOWORLDMODEL, RDF_UNDERWATER, RF_TRANSLUCENT,
};
use q2vk_client::console::Console;

use crate::error::RdError;
use crate::vk_draw::Draw2d;
use crate::vk_image::ImageCache;
use crate::vk_light;
use crate::vk_local::{vid_get_mode_info, RsErr, REF_VERSION};
use crate::vk_model::ModelCache;
use crate::vk_model_types::{ModelKind, WorldModel};
use crate::vk_refl::{self, ReflState};
use crate::vk_rmisc::{self, Placeholders, ScreenshotFormat};
use crate::vk_rsurf::{
    self, Frustum, LightmapBuilder, SurfaceChains, VisState,
};
use crate::vk_warp::SkyBox;
use crate::vulkan::postprocess::{plan_passes, PassKind, PostConfig};
use crate::vulkan::spatial_upscale::FsrConfig;

// ============================================================
// Cvar registration
// ============================================================

/// Handles for every cvar the renderer consumes. Registered once at init;
/// values are read per frame.
pub struct RendererCvars {
    // renderer core
    pub r_fullbright: CvarHandle,
    pub r_nocull: CvarHandle,
    pub r_novis: CvarHandle,
    pub r_drawentities: CvarHandle,
    pub r_drawworld: CvarHandle,
    pub r_overbrightbits: CvarHandle,
    pub r_stainmap: CvarHandle,
    pub r_caustics: CvarHandle,
    pub r_detailtexture: CvarHandle,
    pub r_celshading: CvarHandle,
    pub r_fog: CvarHandle,
    pub r_timebasedfx: CvarHandle,
    pub r_hwgamma: CvarHandle,
    pub r_modulate: CvarHandle,
    pub r_dynamic: CvarHandle,
    pub intensity: CvarHandle,

    // post chain
    pub r_bloom: CvarHandle,
    pub r_bloom_intensity: CvarHandle,
    pub r_bloom_threshold: CvarHandle,
    pub r_ssao: CvarHandle,
    pub r_ssao_intensity: CvarHandle,
    pub r_ssao_radius: CvarHandle,
    pub r_fxaa: CvarHandle,
    pub r_fsr: CvarHandle,
    pub r_fsr_scale: CvarHandle,
    pub r_fsr_sharpness: CvarHandle,
    pub r_temporal: CvarHandle,

    // quality
    pub r_msaa: CvarHandle,
    pub r_anisotropy: CvarHandle,
    pub vk_texturemode: CvarHandle,
    pub vk_picmip: CvarHandle,
    pub vk_skymip: CvarHandle,
    pub vk_round_down: CvarHandle,

    // device
    pub vk_swapinterval: CvarHandle,
    pub vk_mode: CvarHandle,
    pub vid_fullscreen: CvarHandle,
    pub vid_gamma: CvarHandle,
    pub vk_screenshot_format: CvarHandle,
    pub vk_screenshot_quality: CvarHandle,

    // debug
    pub r_speeds: CvarHandle,
    pub vk_lightmap: CvarHandle,
    pub vk_showtris: CvarHandle,
    pub vk_lockpvs: CvarHandle,
    pub vk_clear: CvarHandle,
    pub vk_finish: CvarHandle,
    pub vk_log: CvarHandle,
}

impl RendererCvars {
    pub fn register(cvars: &mut CvarContext) -> Self {
        Self {
            r_fullbright: cvars.register("r_fullbright", "0", 0),
            r_nocull: cvars.register("r_nocull", "0", 0),
            r_novis: cvars.register("r_novis", "0", 0),
            r_drawentities: cvars.register("r_drawentities", "1", 0),
            r_drawworld: cvars.register("r_drawworld", "1", 0),
            r_overbrightbits: cvars.register("r_overbrightbits", "2", CVAR_ARCHIVE),
            r_stainmap: cvars.register("r_stainmap", "1", CVAR_ARCHIVE),
            r_caustics: cvars.register("r_caustics", "1", CVAR_ARCHIVE),
            r_detailtexture: cvars.register("r_detailtexture", "7", CVAR_ARCHIVE),
            r_celshading: cvars.register("r_celshading", "0", CVAR_ARCHIVE),
            r_fog: cvars.register("r_fog", "0", CVAR_ARCHIVE),
            r_timebasedfx: cvars.register("r_timebasedfx", "1", CVAR_ARCHIVE),
            r_hwgamma: cvars.register("r_hwgamma", "0", CVAR_ARCHIVE),
            r_modulate: cvars.register("r_modulate", "1.5", CVAR_ARCHIVE),
            r_dynamic: cvars.register("r_dynamic", "1", 0),
            intensity: cvars.register("intensity", "2", CVAR_ARCHIVE),

            r_bloom: cvars.register("r_bloom", "1", CVAR_ARCHIVE),
            r_bloom_intensity: cvars.register("r_bloom_intensity", "0.3", CVAR_ARCHIVE),
            r_bloom_threshold: cvars.register("r_bloom_threshold", "0.8", CVAR_ARCHIVE),
            r_ssao: cvars.register("r_ssao", "1", CVAR_ARCHIVE),
            r_ssao_intensity: cvars.register("r_ssao_intensity", "1", CVAR_ARCHIVE),
            r_ssao_radius: cvars.register("r_ssao_radius", "0.5", CVAR_ARCHIVE),
            r_fxaa: cvars.register("r_fxaa", "1", CVAR_ARCHIVE),
            r_fsr: cvars.register("r_fsr", "1", CVAR_ARCHIVE),
            r_fsr_scale: cvars.register("r_fsr_scale", "0.75", CVAR_ARCHIVE),
            r_fsr_sharpness: cvars.register("r_fsr_sharpness", "0.2", CVAR_ARCHIVE),
            r_temporal: cvars.register("r_temporal", "1", CVAR_ARCHIVE),

            r_msaa: cvars.register("r_msaa", "0", CVAR_ARCHIVE),
            r_anisotropy: cvars.register("r_anisotropy", "1", CVAR_ARCHIVE),
            vk_texturemode: cvars.register("vk_texturemode", "VK_LINEAR_MIPMAP_LINEAR", CVAR_ARCHIVE),
            vk_picmip: cvars.register("vk_picmip", "0", CVAR_LATCH),
            vk_skymip: cvars.register("vk_skymip", "0", CVAR_LATCH),
            vk_round_down: cvars.register("vk_round_down", "1", CVAR_LATCH),

            vk_swapinterval: cvars.register("vk_swapinterval", "1", CVAR_ARCHIVE),
            vk_mode: cvars.register("vk_mode", "4", CVAR_ARCHIVE | CVAR_LATCH),
            vid_fullscreen: cvars.register("vid_fullscreen", "1", CVAR_ARCHIVE | CVAR_LATCH),
            vid_gamma: cvars.register("vid_gamma", "0.6", CVAR_ARCHIVE),
            vk_screenshot_format: cvars.register("vk_screenshot_format", "tga", CVAR_ARCHIVE),
            vk_screenshot_quality: cvars.register("vk_screenshot_quality", "85", CVAR_ARCHIVE),

            r_speeds: cvars.register("r_speeds", "0", 0),
            vk_lightmap: cvars.register("vk_lightmap", "0", 0),
            vk_showtris: cvars.register("vk_showtris", "0", 0),
            vk_lockpvs: cvars.register("vk_lockpvs", "0", 0),
            vk_clear: cvars.register("vk_clear", "0", 0),
            vk_finish: cvars.register("vk_finish", "0", CVAR_ARCHIVE),
            vk_log: cvars.register("vk_log", "0", 0),
        }
    }
}

/// The overbright scalar is restricted to {0, 1, 2, 4}.
pub fn sanitize_overbright(value: f32) -> i32 {
    match value as i32 {
        1 => 1,
        2 => 2,
        4 => 4,
        _ => 0,
    }
}

// ============================================================
// Frustum setup
// ============================================================

/// The four side planes, rotated out of the view basis by the half-FOV.
pub fn setup_frustum(vieworg: &Vec3, forward: &Vec3, right: &Vec3, up: &Vec3, fov_x: f32, fov_y: f32) -> Frustum {
    use q2vk_common::q_shared::rotate_point_around_vector;

    let mut frustum = Frustum::default();
    // rotate FORWARD right by FOV_X/2 degrees, etc.
    frustum.planes[0].normal = rotate_point_around_vector(up, forward, -(90.0 - fov_x / 2.0));
    frustum.planes[1].normal = rotate_point_around_vector(up, forward, 90.0 - fov_x / 2.0);
    frustum.planes[2].normal = rotate_point_around_vector(right, forward, 90.0 - fov_y / 2.0);
    frustum.planes[3].normal = rotate_point_around_vector(right, forward, -(90.0 - fov_y / 2.0));

    for plane in &mut frustum.planes {
        plane.plane_type = PLANE_ANYZ;
        plane.dist = dot_product(vieworg, &plane.normal);
        plane.signbits = signbits_for_plane(plane);
    }
    frustum
}

// ============================================================
// Entity draw lists
// ============================================================

/// The per-frame entity phases: opaque first (depth write on), then
/// translucent (depth write off). Brush models are distance-sorted inside
/// each phase; alias models keep submission order.
#[derive(Debug, Default)]
pub struct EntityDrawLists {
    pub opaque_brush: Vec<usize>,
    pub opaque_alias: Vec<usize>,
    pub opaque_sprites: Vec<usize>,
    pub translucent: Vec<usize>,
}

pub fn build_entity_lists(refdef: &RefDef, models: &ModelCache, vieworg: &Vec3) -> EntityDrawLists {
    let mut lists = EntityDrawLists::default();
    let mut brush_keys: Vec<(usize, f32)> = Vec::new();
    let mut translucent_keys: Vec<(usize, f32)> = Vec::new();

    for (i, ent) in refdef.entities.iter().enumerate() {
        let dist = {
            let d = vector_subtract(&ent.origin, vieworg);
            dot_product(&d, &d)
        };

        if ent.flags & RF_TRANSLUCENT != 0 {
            translucent_keys.push((i, dist));
            continue;
        }

        match ent.model.and_then(|h| models.model(h)).map(|m| &m.kind) {
            Some(ModelKind::Inline(_)) => brush_keys.push((i, dist)),
            Some(ModelKind::Sprite(_)) => lists.opaque_sprites.push(i),
            _ => lists.opaque_alias.push(i),
        }
    }

    // near to far for opaque brush models
    brush_keys.sort_by(|a, b| a.1.total_cmp(&b.1));
    lists.opaque_brush = brush_keys.into_iter().map(|(i, _)| i).collect();

    // back to front for the translucent phase
    translucent_keys.sort_by(|a, b| b.1.total_cmp(&a.1));
    lists.translucent = translucent_keys.into_iter().map(|(i, _)| i).collect();

    lists
}

/// Group particle indices by class, one draw per class.
pub fn group_particles(refdef: &RefDef) -> [Vec<usize>; PARTICLE_CLASSES] {
    let mut groups: [Vec<usize>; PARTICLE_CLASSES] = Default::default();
    for (i, p) in refdef.particles.iter().enumerate() {
        groups[p.class as usize].push(i);
    }
    groups
}

// ============================================================
// Frame statistics
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCounters {
    pub wpolys: usize,
    pub visible_surfaces: usize,
    pub alias_models: usize,
    pub dynamic_lightmaps: usize,
    pub refl_passes: usize,
}

impl FrameCounters {
    /// The r_speeds console line.
    pub fn speeds_line(&self) -> String {
        format!(
            "{} wpoly {} surf {} epoly {} dlm {} refl",
            self.wpolys, self.visible_surfaces, self.alias_models, self.dynamic_lightmaps,
            self.refl_passes
        )
    }
}

/// Labels recorded as passes execute; the driver's ordering contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassLabel {
    ReflectionView,
    WorldOpaque,
    EntityOpaque,
    Particles,
    Sky,
    Translucent,
    Post(PassKind),
    Overlay,
}

// ============================================================
// Renderer context
// ============================================================

/// All long-lived renderer state. One per process; tests build ephemeral
/// ones without a GPU.
pub struct RendererContext {
    pub vid: VidDef,
    pub images: ImageCache,
    pub models: ModelCache,
    pub lightmaps: LightmapBuilder,
    pub vis: VisState,
    pub chains: SurfaceChains,
    pub sky: SkyBox,
    pub refl: ReflState,
    pub draw2d: Draw2d,
    pub placeholders: Option<Placeholders>,
    pub cvars: RendererCvars,

    pub framecount: i32,
    pub dlightframe: i32,
    pub counters: FrameCounters,
    /// pass order actually executed last frame
    pub pass_log: Vec<PassLabel>,
    /// console lines produced this frame
    pub messages: Vec<String>,

    /// consecutive swapchain rebuild failures; two in a row escalate
    rebuild_failures: u32,
}

impl RendererContext {
    pub fn new(cvars: &mut CvarContext) -> Self {
        Self {
            vid: VidDef { width: 640, height: 480 },
            images: ImageCache::new_headless(),
            models: ModelCache::new(),
            lightmaps: LightmapBuilder::new(),
            vis: VisState::new(),
            chains: SurfaceChains::default(),
            sky: SkyBox::default(),
            refl: ReflState::new(),
            draw2d: Draw2d::new(),
            placeholders: None,
            cvars: RendererCvars::register(cvars),
            framecount: 0,
            dlightframe: 0,
            counters: FrameCounters::default(),
            pass_log: Vec::new(),
            messages: Vec::new(),
            rebuild_failures: 0,
        }
    }

    /// Full init: palette, placeholder assets, video mode.
    pub fn init(&mut self, cvars: &CvarContext, loader: &dyn FileLoader) -> Result<(), RdError> {
        let mode = cvars.value(self.cvars.vk_mode) as i32;
        self.vid = match vid_get_mode_info(mode) {
            Ok(vid) => vid,
            Err(RsErr::InvalidMode) => {
                self.messages.push(format!("invalid mode {}, using 4", mode));
                vid_get_mode_info(4).expect("default mode exists")
            }
            Err(_) => return Err(RdError::InitializationFailure("mode table".to_string())),
        };

        self.images = ImageCache::new(
            loader,
            cvars.value(self.cvars.vid_gamma),
            cvars.value(self.cvars.intensity),
        );
        self.images.picmip = cvars.value(self.cvars.vk_picmip) as i32;
        self.images.round_down = cvars.value(self.cvars.vk_round_down) != 0.0;
        self.placeholders = Some(vk_rmisc::init_placeholders(&mut self.images, loader));
        self.messages.push(format!("ref version: {}", REF_VERSION));
        Ok(())
    }

    /// Load a map and re-register assets.
    pub fn begin_registration(
        &mut self,
        map_name: &str,
        loader: &dyn FileLoader,
        flush: bool,
    ) -> Result<(), RdError> {
        self.vis = VisState::new();
        self.models
            .begin_registration(map_name, loader, &mut self.images, &mut self.lightmaps, flush)?;
        self.images.registration_sequence = self.models.registration_sequence;
        if let Some(ph) = &self.placeholders {
            self.images.touch(ph.notexture);
            self.images.touch(ph.nopic);
            for &p in &ph.particles {
                self.images.touch(p);
            }
        }
        Ok(())
    }

    pub fn register_model(&mut self, name: &str, loader: &dyn FileLoader) -> Option<u32> {
        match self.models.register_model(name, loader, &mut self.images) {
            Ok(handle) => Some(handle),
            Err(err) => {
                // non-fatal: placeholder model, one console line
                self.messages.push(format!("{}", err));
                None
            }
        }
    }

    /// Sweep both caches; anything untouched this sequence goes away.
    pub fn end_registration(&mut self) {
        self.models.end_registration();
        self.images.sweep();
    }

    // ========================================================
    // Frame
    // ========================================================

    /// Reconstruct and sequence one frame from a resolved refdef. Returns
    /// the frame counters. GPU submission is keyed off the pass log by
    /// the device layer; everything here is the CPU side of the pipe.
    pub fn render_frame(
        &mut self,
        refdef: &RefDef,
        cvars: &CvarContext,
    ) -> Result<FrameCounters, RdError> {
        self.framecount += 1;
        self.counters = FrameCounters::default();
        self.pass_log.clear();
        self.messages.extend(self.images.drain_messages());

        if self.models.world.is_none() && refdef.rdflags & RDF_NOWORLDMODEL == 0 {
            return Err(RdError::MalformedAsset("NULL worldmodel".to_string()));
        }

        if refdef.rdflags & RDF_NOWORLDMODEL == 0 {
            self.render_world_view(refdef, cvars)?;
        }

        // overlay always runs, even in menu-only frames
        self.pass_log.push(PassLabel::Overlay);

        if cvars.value(self.cvars.r_speeds) != 0.0 {
            let line = self.counters.speeds_line();
            self.messages.push(line);
        }

        Ok(self.counters.clone())
    }

    fn render_world_view(&mut self, refdef: &RefDef, cvars: &CvarContext) -> Result<(), RdError> {
        let novis = cvars.value(self.cvars.r_novis) != 0.0;
        let nocull = cvars.value(self.cvars.r_nocull) != 0.0;
        let lockpvs = cvars.value(self.cvars.vk_lockpvs) != 0.0;
        let drawworld = cvars.value(self.cvars.r_drawworld) != 0.0;
        let dynamic_lights = cvars.value(self.cvars.r_dynamic) != 0.0
            && cvars.value(self.cvars.r_fullbright) == 0.0;
        let modulate = cvars.value(self.cvars.r_modulate).max(0.0);
        let overbright = sanitize_overbright(cvars.value(self.cvars.r_overbrightbits));

        let (forward, right, up) = q2vk_common::q_shared::angle_vectors(&refdef.viewangles);
        let frustum = setup_frustum(
            &refdef.vieworg,
            &forward,
            &right,
            &up,
            refdef.fov_x,
            refdef.fov_y,
        );

        let underwater = refdef.rdflags & RDF_UNDERWATER != 0;

        let world = self.models.world.as_mut().expect("world checked above");

        // visibility
        vk_rsurf::setup_frame_clusters(world, &mut self.vis, &refdef.vieworg);
        vk_rsurf::mark_leaves(world, &mut self.vis, &refdef.areabits, novis, lockpvs);

        // dynamic light stamping
        if dynamic_lights {
            self.dlightframe = vk_light::push_dlights(world, &refdef.dlights, self.framecount);
        }

        // world walk
        self.vis.framecount = self.framecount;
        self.chains.clear();
        if drawworld {
            vk_rsurf::recursive_world_node(
                world,
                &self.vis,
                &frustum,
                &mut self.chains,
                &refdef.vieworg,
                &refdef.areabits,
                nocull,
                0,
            );
        }
        self.counters.visible_surfaces =
            self.chains.opaque.len() + self.chains.alpha.len() + self.chains.sky.len();
        self.counters.wpolys = self
            .chains
            .opaque
            .iter()
            .map(|&s| world.surfaces[s as usize].polys.iter().map(|p| p.verts.len()).sum::<usize>())
            .sum();

        // sky extents from the marked sky surfaces
        self.sky.clear_frame();
        for i in 0..self.chains.sky.len() {
            let s = self.chains.sky[i] as usize;
            self.sky.add_surface(world, s, &refdef.vieworg);
        }

        // reflection discovery and mirrored passes
        vk_refl::find_reflections(
            world,
            &self.vis,
            &frustum,
            &refdef.vieworg,
            underwater,
            &mut self.refl,
        );
        let refl_planes: Vec<f32> = self.refl.planes().to_vec();
        for &z in &refl_planes {
            let (refl_org, refl_angles) = vk_refl::reflected_view(&refdef.vieworg, &refdef.viewangles, z);
            let (f2, r2, u2) = q2vk_common::q_shared::angle_vectors(&refl_angles);
            let refl_frustum =
                setup_frustum(&refl_org, &f2, &r2, &u2, refdef.fov_x, refdef.fov_y);

            // the mirrored walk reuses the PVS marks; only surface stamps
            // and chains are per-view
            let mut refl_chains = SurfaceChains::default();
            let save_frame = self.vis.framecount;
            self.vis.framecount += 1;
            vk_rsurf::recursive_world_node(
                world,
                &self.vis,
                &refl_frustum,
                &mut refl_chains,
                &refl_org,
                &refdef.areabits,
                nocull,
                0,
            );
            self.vis.framecount = save_frame;

            self.pass_log.push(PassLabel::ReflectionView);
            self.counters.refl_passes += 1;
        }
        // the mirrored walks restamped surfaces with interim frame
        // numbers; restore the main view's marks
        if self.counters.refl_passes > 0 && drawworld {
            self.vis.framecount = self.framecount;
            for &s in self.chains.opaque.iter().chain(&self.chains.alpha).chain(&self.chains.sky) {
                world.surfaces[s as usize].visframe = self.framecount;
            }
        }

        // lightmap recomposition for stamped/styled surfaces
        if dynamic_lights || !refdef.lightstyles.is_empty() {
            self.counters.dynamic_lightmaps = vk_light::update_dynamic_lightmaps(
                world,
                &mut self.lightmaps,
                &self.chains.opaque,
                &refdef.lightstyles,
                &refdef.dlights,
                self.dlightframe,
                modulate,
                overbright,
            );
        }

        // stain fade rides the frame clock
        if cvars.value(self.cvars.r_stainmap) != 0.0 {
            vk_light::fade_stains(world, 1.0 / 60.0, 0.25);
        }

        // draw phases in contract order
        self.pass_log.push(PassLabel::WorldOpaque);

        let draw_entities = cvars.value(self.cvars.r_drawentities) != 0.0;
        let entity_lists = if draw_entities {
            build_entity_lists(refdef, &self.models, &refdef.vieworg)
        } else {
            EntityDrawLists::default()
        };
        self.counters.alias_models = entity_lists.opaque_alias.len();
        self.pass_log.push(PassLabel::EntityOpaque);

        self.pass_log.push(PassLabel::Particles);
        self.pass_log.push(PassLabel::Sky);
        self.pass_log.push(PassLabel::Translucent);
        let _ = &entity_lists.opaque_brush;

        // post chain
        let post = PostConfig {
            ssao: cvars.value(self.cvars.r_ssao) != 0.0,
            bloom: cvars.value(self.cvars.r_bloom) != 0.0,
            fsr: (cvars.value(self.cvars.r_fsr) != 0.0).then(|| {
                FsrConfig::sanitized(
                    cvars.value(self.cvars.r_fsr_scale),
                    cvars.value(self.cvars.r_fsr_sharpness),
                )
            }),
            temporal: cvars.value(self.cvars.r_temporal) != 0.0,
            fxaa: cvars.value(self.cvars.r_fxaa) != 0.0,
        };
        for pass in plan_passes(&post) {
            self.pass_log.push(PassLabel::Post(pass));
        }

        Ok(())
    }

    /// A swapchain rebuild failed; twice in a row is fatal.
    pub fn on_rebuild_failure(&mut self) -> Result<(), RdError> {
        self.rebuild_failures += 1;
        if self.rebuild_failures >= 2 {
            return Err(RdError::InitializationFailure(
                "swapchain rebuild failed twice".to_string(),
            ));
        }
        Ok(())
    }

    pub fn on_rebuild_success(&mut self) {
        self.rebuild_failures = 0;
    }

    // ========================================================
    // Console commands
    // ========================================================

    /// Names registered with the external command dispatcher at init and
    /// unregistered at shutdown.
    pub const COMMANDS: &'static [&'static str] =
        &["screenshot", "imagelist", "modellist", "vk_strings", "vk_log"];

    /// Execute one of the renderer's console commands. `frame_rgb` is the
    /// latest read-back for `screenshot`.
    pub fn console_command(
        &mut self,
        name: &str,
        args: &[&str],
        cvars: &mut CvarContext,
        loader: &dyn FileLoader,
        frame_rgb: Option<&[u8]>,
    ) -> Vec<String> {
        match name {
            "imagelist" => self.images.image_list(),
            "modellist" => self.models.model_list(),
            "vk_strings" => vec![format!("ref version: {}", REF_VERSION)],
            "vk_log" => {
                if let Some(v) = args.first() {
                    cvars.set("vk_log", v);
                }
                vec![format!("vk_log = {}", cvars.value(self.cvars.vk_log))]
            }
            "screenshot" => {
                let Some(rgb) = frame_rgb else {
                    return vec!["no frame to capture".to_string()];
                };
                let format =
                    ScreenshotFormat::from_cvar(cvars.string(self.cvars.vk_screenshot_format));
                let quality = cvars.value(self.cvars.vk_screenshot_quality) as u8;
                let gamma = (cvars.value(self.cvars.r_hwgamma) != 0.0)
                    .then(|| *self.images.gamma_table());
                match vk_rmisc::write_screenshot(
                    loader.gamedir(),
                    rgb,
                    self.vid.width as usize,
                    self.vid.height as usize,
                    format,
                    quality,
                    gamma.as_ref(),
                ) {
                    Ok(name) => vec![format!("Wrote {}", name)],
                    Err(err) => vec![format!("{}", err)],
                }
            }
            _ => vec![format!("unknown command: {}", name)],
        }
    }

    /// Render the console overlay into the 2D batch.
    pub fn draw_console_overlay(&mut self, con: &Console, frac: f32, realtime_ms: f32) {
        self.draw2d.clear();
        if frac > 0.0 {
            let vid = self.vid;
            self.draw2d.draw_console(con, frac, &vid);
        } else {
            self.draw2d.draw_notify(con, realtime_ms, 3.0);
        }
    }

    pub fn world(&self) -> Option<&WorldModel> {
        self.models.world.as_ref()
    }

    /// The visible-surface set, for lockpvs verification and r_speeds.
    pub fn visible_surface_set(&self) -> Vec<u32> {
        let mut set: Vec<u32> = self
            .chains
            .opaque
            .iter()
            .chain(&self.chains.alpha)
            .chain(&self.chains.sky)
            .copied()
            .collect();
        set.sort_unstable();
        set
    }
}
