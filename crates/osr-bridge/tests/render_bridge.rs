//! End-to-end frame flow against the software device backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gpu_interop::soft::{SoftDevice, SoftFault, SoftGpu, SoftTexture};
use osr_bridge::{
    AcceleratedPaintInfo, BridgeConfig, PaintElementType, PaintError, Rect, RenderBridge,
    RenderHandler, SharedTextureHandle,
};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn paint_info(handle: SharedTextureHandle) -> AcceleratedPaintInfo {
    AcceleratedPaintInfo {
        shared_texture_handle: handle,
    }
}

fn bridge_with_counter() -> (Arc<RenderBridge<SoftDevice>>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let bridge = RenderBridge::with_notifier(BridgeConfig::default(), move |_: &PaintError| {
        seen.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    (Arc::new(bridge), count)
}

/// Browser-side frame: a texture on the browser's own device, shared by
/// handle.
struct BrowserFrame {
    texture: SoftTexture,
    handle: SharedTextureHandle,
}

impl BrowserFrame {
    fn new(gpu: &SoftGpu, color: u32) -> Self {
        let texture = SoftTexture::filled(WIDTH, HEIGHT, color);
        let handle = gpu.share(&texture);
        Self { texture, handle }
    }
}

#[test]
fn bind_paint_fail_rebind_scenario() {
    let gpu = SoftGpu::new();
    let device_a = gpu.create_device();
    let tex_a = SoftTexture::new(WIDTH, HEIGHT);
    let (bridge, notified) = bridge_with_counter();
    let handler: Arc<dyn RenderHandler> = bridge.clone();

    bridge.bind(device_a.clone(), tex_a.clone()).unwrap();
    assert_eq!(handler.view_rect(), Rect::new(0, 0, 800, 600));

    let h1 = BrowserFrame::new(&gpu, 0x11);
    handler.on_accelerated_paint(PaintElementType::View, Rect::default(), &paint_info(h1.handle));
    assert_eq!(tex_a.pixels(), h1.texture.pixels());

    let h2 = BrowserFrame::new(&gpu, 0x22);
    handler.on_accelerated_paint(PaintElementType::Popup, Rect::default(), &paint_info(h2.handle));
    assert_eq!(tex_a.pixels(), h1.texture.pixels());

    let h3 = BrowserFrame::new(&gpu, 0x33);
    gpu.inject_fault(SoftFault::Copy);
    handler.on_accelerated_paint(PaintElementType::View, Rect::default(), &paint_info(h3.handle));
    assert!(!bridge.rendering_enabled());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(tex_a.pixels(), h1.texture.pixels());

    bridge.bind(device_a, tex_a.clone()).unwrap();
    assert!(bridge.rendering_enabled());

    let h4 = BrowserFrame::new(&gpu, 0x44);
    handler.on_accelerated_paint(PaintElementType::View, Rect::default(), &paint_info(h4.handle));
    assert_eq!(tex_a.pixels(), h4.texture.pixels());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
fn every_frame_is_applied_in_order() {
    let gpu = SoftGpu::new();
    let device = gpu.create_device();
    device.set_fence_latency(4);
    let target = SoftTexture::new(WIDTH, HEIGHT);
    let (bridge, _) = bridge_with_counter();
    bridge.bind(device, target.clone()).unwrap();

    for color in 1..=16 {
        let frame = BrowserFrame::new(&gpu, color);
        bridge.paint(PaintElementType::View, frame.handle);
        // Frame handles are only valid during the paint call.
        gpu.release(frame.handle);
        assert_eq!(target.pixels()[0], color);
        assert_eq!(target.pixels(), frame.texture.pixels());
    }
    assert_eq!(bridge.stats().frames_copied, 16);
    assert_eq!(gpu.counters().copies_executed, 16);
}

#[test]
fn invalid_handle_after_bind_then_rebind() {
    let gpu = SoftGpu::new();
    let (bridge, notified) = bridge_with_counter();
    bridge
        .bind(gpu.create_device(), SoftTexture::new(WIDTH, HEIGHT))
        .unwrap();

    bridge.paint(PaintElementType::View, SharedTextureHandle::nt(0));
    assert!(!bridge.rendering_enabled());
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    bridge.paint(PaintElementType::View, SharedTextureHandle::nt(0));
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    bridge
        .bind(gpu.create_device(), SoftTexture::new(WIDTH, HEIGHT))
        .unwrap();
    assert!(bridge.rendering_enabled());
}

#[test]
fn rebind_to_new_device_moves_fence_and_source_device() {
    let gpu = SoftGpu::new();
    let first = gpu.create_device();
    let second = gpu.create_device();
    let old_target = SoftTexture::new(WIDTH, HEIGHT);
    let new_target = SoftTexture::new(WIDTH / 2, HEIGHT / 2);
    let (bridge, notified) = bridge_with_counter();

    bridge.bind(first, old_target.clone()).unwrap();
    bridge.paint(PaintElementType::View, BrowserFrame::new(&gpu, 0x5).handle);

    bridge.bind(second.clone(), new_target.clone()).unwrap();
    assert!(second.is_multithread_protected());
    assert_eq!(bridge.view_rect(), Rect::new(0, 0, 400, 300));

    let small = SoftTexture::filled(WIDTH / 2, HEIGHT / 2, 0x6);
    bridge.paint(PaintElementType::View, gpu.share(&small));

    assert_eq!(new_target.pixels(), small.pixels());
    assert_eq!(old_target.pixels()[0], 0x5);
    assert_eq!(gpu.counters().openers_created, 2);
    assert_eq!(gpu.counters().fences_created, 2);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}
