//! Flows and the window event loop.
//!
//! A "flow" is a self-contained part of the scene. It loads its assets, reacts
//! to asynchronous results, updates itself every frame and says what to draw.
//! The event loop owns the GPU [`Context`], forwards input to the orbit controls
//! and renders everything the flows return.
//!
//! Scenes implement [`GraphicsFlow<S, E>`] and hand asynchronous work back to
//! the loop through [`Out<S, E>`].
//!
//! Every redraw does the following:
//! 1. Forward window input to the orbit controls
//! 2. Update flow state (via `on_update`) and the camera uniform
//! 3. Call flows' `on_render()` to collect renderable objects
//! 4. Render one shadow map per shadow casting light
//! 5. Render the background and the lit scene, resolving MSAA into the frame
//! 6. Present frame

use std::{fmt::Debug, iter, pin::Pin, sync::Arc};

use instant::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    config::SceneConfig,
    context::{Context, InitContext},
    data_structures::model::{DrawModel, DrawShadow},
    render::Instanced,
};

/// What a lifecycle hook asks the event loop to do next.
///
/// - `FutEvent`: run the futures (blocking on tokio natively, `spawn_local` in the
///   browser) and deliver each result to `on_custom_events`
/// - `Configure`: mutate the [`Context`] and shared state once
/// - `Empty`: nothing
pub enum Out<S, E> {
    FutEvent(Vec<Box<dyn Future<Output = E>>>),
    Configure(Box<dyn FnOnce(&mut Context, &mut S)>),
    Empty,
}

impl<S, E> Default for Out<S, E> {
    fn default() -> Self {
        Self::Empty
    }
}

/// A part of the scene driven by the event loop.
///
/// `on_init` runs once after the context exists, `on_update` and `on_render` once
/// per frame, `on_custom_events` whenever an `Out::FutEvent` resolves.
pub trait GraphicsFlow<S, E> {
    /// Typically starts asynchronous asset loads, which come back as custom events.
    fn on_init(&mut self, ctx: &mut Context, state: &mut S) -> Out<S, E>;

    /// `dt` is the time since the previous frame.
    fn on_update(&mut self, ctx: &Context, state: &mut S, dt: Duration) -> Out<S, E>;

    /// Returns the event when this flow does not handle it, so the next flow sees it.
    fn on_custom_events(&mut self, ctx: &mut Context, state: &mut S, event: E) -> Option<E>;

    /// Everything this flow draws. Shadow casters are drawn into the shadow maps too.
    fn on_render(&self) -> crate::render::Render<'_>;
}

impl<State, Event> Debug for dyn GraphicsFlow<State, Event> + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GraphicsFlow")
    }
}

/// Builds a flow once the GPU context is ready. Construction may await asset loads.
pub type FlowConstructor<S, E> =
    Box<dyn FnOnce(InitContext) -> Pin<Box<dyn Future<Output = Box<dyn GraphicsFlow<S, E>>>>>>;

/// The GPU context together with the state shared by all flows.
#[derive(Debug)]
pub struct AppState<State: 'static> {
    pub(crate) ctx: Context,
    state: State,
    is_surface_configured: bool,
}

impl<State: Default> AppState<State> {
    async fn new(window: Arc<Window>, scene: &SceneConfig) -> anyhow::Result<Self> {
        let ctx = Context::new(window, scene).await?;
        Ok(Self {
            ctx,
            state: State::default(),
            is_surface_configured: false,
        })
    }
}

impl<State> AppState<State> {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.ctx.config.width = width;
            self.ctx.config.height = height;
            self.is_surface_configured = true;
            self.ctx.projection.resize(width, height);
            self.ctx.camera.controller.resize(height);
            self.ctx
                .surface
                .configure(&self.ctx.device, &self.ctx.config);
            self.ctx.recreate_attachments();
        }
    }

    /// Applies the orbit controls and uploads the camera uniform.
    fn update_camera(&mut self) {
        let ctx = &mut self.ctx;
        ctx.camera
            .controller
            .update(&mut ctx.camera.camera, ctx.projection.fovy());
        ctx.camera
            .uniform
            .update_view_proj(&ctx.camera.camera, &ctx.projection);
        ctx.queue.write_buffer(
            &ctx.camera.buffer,
            0,
            bytemuck::cast_slice(&[ctx.camera.uniform]),
        );
    }

    fn render<Event>(
        &mut self,
        flows: &[Box<dyn GraphicsFlow<State, Event>>],
    ) -> Result<(), wgpu::SurfaceError> {
        // Keeps the frame loop going
        self.ctx.window.request_redraw();
        if !self.is_surface_configured {
            return Ok(());
        }

        let frame = self.ctx.surface.get_current_texture()?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut lit: Vec<Instanced> = Vec::new();
        let mut shadow: Vec<Instanced> = Vec::new();
        for flow in flows {
            flow.on_render().set_pipelines(&mut lit, &mut shadow);
        }
        lit.retain(|drawable| drawable.amount > 0);
        shadow.retain(|drawable| drawable.amount > 0);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.draw_shadow_maps(&mut encoder, &shadow);
        self.draw_scene(&mut encoder, &frame_view, &lit);

        self.ctx.queue.submit(iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// One depth-only pass per shadow casting light, each into its own layer.
    fn draw_shadow_maps(&self, encoder: &mut wgpu::CommandEncoder, casters: &[Instanced]) {
        let light = &self.ctx.light;
        for index in light.shadow_casters() {
            let layer = &light.shadow_views[index];
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &layer.target,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.ctx.pipelines.shadow);
            for caster in casters {
                pass.set_vertex_buffer(1, caster.instance.slice(..));
                pass.draw_model_depth(caster.model, 0..caster.amount as u32, &layer.bind_group);
            }
        }
    }

    /// Background and lit geometry. With MSAA the multisampled target is
    /// resolved into `frame_view`.
    fn draw_scene(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame_view: &wgpu::TextureView,
        drawables: &[Instanced],
    ) {
        let ctx = &self.ctx;
        let (view, resolve_target) = match &ctx.msaa_target {
            Some(msaa) => (&msaa.view, Some(frame_view)),
            None => (frame_view, None),
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(ctx.clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.depth_texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        if ctx.show_background {
            pass.set_pipeline(&ctx.pipelines.background);
            pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
            pass.set_bind_group(1, &ctx.light.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        pass.set_pipeline(&ctx.pipelines.lit);
        for drawable in drawables {
            pass.set_vertex_buffer(1, drawable.instance.slice(..));
            pass.draw_model_instanced(
                drawable.model,
                0..drawable.amount as u32,
                &ctx.camera.bind_group,
                &ctx.light.bind_group,
            );
        }
    }
}

pub struct App<State: 'static, Event: 'static> {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: winit::event_loop::EventLoopProxy<FlowEvent<State, Event>>,
    state: Option<AppState<State>>,
    config_file: String,
    flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    // Taken on the first `resumed`
    constructors: Option<Vec<FlowConstructor<State, Event>>>,
    last_frame: Instant,
}

impl<State, Event> App<State, Event>
where
    State: 'static,
    Event: 'static,
{
    fn new(
        event_loop: &EventLoop<FlowEvent<State, Event>>,
        config_file: &str,
        constructors: Vec<FlowConstructor<State, Event>>,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            state: None,
            config_file: config_file.to_string(),
            flows: Vec::new(),
            constructors: Some(constructors),
            last_frame: Instant::now(),
        })
    }

    /// Runs `on_init` of every flow and starts the frame loop.
    fn start(&mut self, mut stage: AppState<State>) {
        let size = stage.ctx.window.inner_size();
        stage.resize(size.width, size.height);
        for flow in &mut self.flows {
            let out = flow.on_init(&mut stage.ctx, &mut stage.state);
            handle_flow_output(
                #[cfg(not(target_arch = "wasm32"))]
                &self.async_runtime,
                &self.proxy,
                &mut stage,
                out,
            );
        }
        stage.ctx.window.request_redraw();
        self.last_frame = Instant::now();
        self.state = Some(stage);
    }
}

pub(crate) enum FlowEvent<State: 'static, Event: 'static> {
    #[allow(dead_code)]
    Initialized {
        state: AppState<State>,
        flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    },
    Custom(Event),
}

impl<State, Event> Debug for FlowEvent<State, Event> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { state: _, flows } => {
                f.debug_struct("Initialized").field("flows", flows).finish()
            }
            Self::Custom(_) => f.write_str("Custom(E)"),
        }
    }
}

impl<State: 'static + Default, Event: 'static> ApplicationHandler<FlowEvent<State, Event>>
    for App<State, Event>
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(constructors) = self.constructors.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("car-scene");

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowAttributesExtWebSys;

            match find_canvas() {
                Some(canvas) => window_attributes = window_attributes.with_canvas(Some(canvas)),
                None => log::warn!("No #{CANVAS_ID} element, winit creates its own canvas"),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Unable to create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        let config_file = self.config_file.clone();
        let startup = async move {
            let scene = SceneConfig::load(&config_file).await?;
            let stage = AppState::new(window, &scene).await?;

            let flow_futures: Vec<_> = constructors
                .into_iter()
                .map(|constructor| constructor((&stage.ctx).into()))
                .collect();
            let flows: Vec<_> = futures::future::join_all(flow_futures).await;
            anyhow::Ok((stage, flows))
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(startup) {
                Ok((stage, flows)) => {
                    self.flows = flows;
                    self.start(stage);
                }
                Err(e) => {
                    log::error!("App initialization failed: {e:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match startup.await {
                    Ok((stage, flows)) => {
                        if proxy
                            .send_event(FlowEvent::Initialized {
                                state: stage,
                                flows,
                            })
                            .is_err()
                        {
                            log::error!("Event loop closed before the scene was initialized");
                        }
                    }
                    Err(e) => {
                        log::error!("App initialization failed: {e:#}");
                        if e
                            .downcast_ref::<crate::context::ContextError>()
                            .is_some_and(crate::context::ContextError::shows_webgl_warning)
                        {
                            show_webgl_warning();
                        }
                    }
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: FlowEvent<State, Event>) {
        match event {
            FlowEvent::Initialized { state, flows } => {
                self.flows = flows;
                self.start(state);
            }
            FlowEvent::Custom(custom_event) => {
                if let Some(state) = &mut self.state {
                    let result = self
                        .flows
                        .iter_mut()
                        .fold(Some(custom_event), |event, flow| {
                            flow.on_custom_events(&mut state.ctx, &mut state.state, event?)
                        });
                    if result.is_some() {
                        log::warn!("No flow handled a custom event");
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        state.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_frame.elapsed();
                self.last_frame = Instant::now();

                state.update_camera();
                for flow in &mut self.flows {
                    let out = flow.on_update(&state.ctx, &mut state.state, dt);
                    handle_flow_output(
                        #[cfg(not(target_arch = "wasm32"))]
                        &self.async_runtime,
                        &self.proxy,
                        state,
                        out,
                    );
                }

                match state.render(&self.flows) {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Frame dropped: {e}");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Natively the futures are driven to completion right away; in the browser each
/// one is spawned and posts its event as soon as it resolves.
fn handle_flow_output<State, Event>(
    #[cfg(not(target_arch = "wasm32"))] async_runtime: &tokio::runtime::Runtime,
    proxy: &winit::event_loop::EventLoopProxy<FlowEvent<State, Event>>,
    stage: &mut AppState<State>,
    out: Out<State, Event>,
) {
    let futures = match out {
        Out::FutEvent(futures) => futures,
        Out::Configure(configure) => return configure(&mut stage.ctx, &mut stage.state),
        Out::Empty => return,
    };
    for future in futures {
        let future = Pin::from(future);
        #[cfg(not(target_arch = "wasm32"))]
        {
            let event = async_runtime.block_on(future);
            if proxy.send_event(FlowEvent::Custom(event)).is_err() {
                log::error!("Event loop closed, dropping custom event");
                return;
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            let proxy = proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = future.await;
                if proxy.send_event(FlowEvent::Custom(event)).is_err() {
                    log::error!("Event loop closed, dropping custom event");
                }
            });
        }
    }
}

#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "canvas";

#[cfg(target_arch = "wasm32")]
fn find_canvas() -> Option<web_sys::HtmlCanvasElement> {
    use wasm_bindgen::JsCast;

    web_sys::window()?
        .document()?
        .get_element_by_id(CANVAS_ID)?
        .dyn_into()
        .ok()
}

/// Appends a notice to the page when no WebGL2 context can be created.
#[cfg(target_arch = "wasm32")]
fn show_webgl_warning() {
    let Some(document) = web_sys::window().and_then(|window| window.document()) else {
        return;
    };
    let Some(body) = document.body() else {
        return;
    };
    let Ok(message) = document.create_element("div") else {
        return;
    };
    message.set_id("webglmessage");
    let _ = message.set_attribute(
        "style",
        "font-family:monospace;font-size:13px;text-align:center;background:#fff;\
         color:#000;padding:1.5em;width:400px;margin:5em auto 0",
    );
    message.set_text_content(Some(
        "Your graphics card or browser does not seem to support WebGL 2.",
    ));
    let _ = body.append_child(&message);
}

/// Loads `config_file` from the asset root and runs the flows until the window closes.
pub fn run<State: 'static + Default, Event: 'static>(
    config_file: &str,
    constructors: Vec<FlowConstructor<State, Event>>,
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        // Load progress is logged at info
        if let Err(e) =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .try_init()
        {
            eprintln!("Logger already initialised: {e}");
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {e}").into());
        }
    }

    let event_loop: EventLoop<FlowEvent<State, Event>> = EventLoop::with_user_event().build()?;

    let mut app: App<State, Event> = App::new(&event_loop, config_file, constructors)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}
