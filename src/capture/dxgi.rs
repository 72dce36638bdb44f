//! Desktop duplication capture for Windows.
//!
//! Uses the Direct3D 11 desktop duplication API: the compositor hands out
//! the desktop texture, which is copied into a CPU-readable staging texture
//! and mapped. All unsafe FFI stays in this file.

use super::backend::{CaptureBackend, CaptureMethod, DisplayGeometry};
use crate::error::CaptureError;
use crate::frame::{PixelLayout, RawFrame};
use std::time::Duration;
use tracing::{debug, info};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::*;

struct DuplicationHandles {
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    staging_texture: ID3D11Texture2D,
}

pub struct DxgiBackend {
    monitor: u32,
    geometry: Option<DisplayGeometry>,
    handles: Option<DuplicationHandles>,
}

fn unavailable(step: &str, e: windows::core::Error) -> CaptureError {
    CaptureError::Unavailable {
        details: format!("{} failed: {}", step, e),
    }
}

impl DxgiBackend {
    pub fn new(monitor: u32) -> Self {
        Self {
            monitor,
            geometry: None,
            handles: None,
        }
    }

    unsafe fn open(monitor: u32) -> Result<(DuplicationHandles, DisplayGeometry), CaptureError> {
        let mut device = None;
        let mut context = None;
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
        .map_err(|e| unavailable("D3D11CreateDevice", e))?;

        let device: ID3D11Device = device.ok_or_else(|| CaptureError::Unavailable {
            details: "D3D11 device missing".to_string(),
        })?;
        let context = context.ok_or_else(|| CaptureError::Unavailable {
            details: "D3D11 context missing".to_string(),
        })?;

        let dxgi_device: IDXGIDevice = device.cast().map_err(|e| unavailable("IDXGIDevice cast", e))?;
        let adapter = dxgi_device
            .GetAdapter()
            .map_err(|e| unavailable("GetAdapter", e))?;
        let output = adapter
            .EnumOutputs(monitor)
            .map_err(|e| unavailable("EnumOutputs", e))?;
        let output1: IDXGIOutput1 = output.cast().map_err(|e| unavailable("IDXGIOutput1 cast", e))?;
        let duplication = output1
            .DuplicateOutput(&device)
            .map_err(|e| unavailable("DuplicateOutput", e))?;

        let desc = duplication.GetDesc();
        let geometry = DisplayGeometry::new(desc.ModeDesc.Width, desc.ModeDesc.Height);

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: geometry.width,
            Height: geometry.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };
        let mut staging_texture = None;
        device
            .CreateTexture2D(&staging_desc, None, Some(&mut staging_texture))
            .map_err(|e| unavailable("CreateTexture2D", e))?;
        let staging_texture = staging_texture.ok_or_else(|| CaptureError::Unavailable {
            details: "staging texture missing".to_string(),
        })?;

        Ok((
            DuplicationHandles {
                context,
                duplication,
                staging_texture,
            },
            geometry,
        ))
    }

    unsafe fn acquire(
        handles: &DuplicationHandles,
        geometry: DisplayGeometry,
        timeout: Duration,
    ) -> Result<RawFrame, CaptureError> {
        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource = None;

        match handles
            .duplication
            .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
        {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                return Err(CaptureError::Timeout(timeout));
            }
            Err(e) => {
                return Err(CaptureError::frame_failed(format!(
                    "AcquireNextFrame failed: {}",
                    e
                )));
            }
        }

        let texture: Result<ID3D11Texture2D, CaptureError> = resource
            .ok_or_else(|| CaptureError::frame_failed("acquired resource missing"))
            .and_then(|resource| {
                resource
                    .cast()
                    .map_err(|e| CaptureError::frame_failed(format!("texture cast failed: {}", e)))
            });
        let texture = match texture {
            Ok(texture) => texture,
            Err(e) => {
                let _ = handles.duplication.ReleaseFrame();
                return Err(e);
            }
        };

        handles
            .context
            .CopyResource(&handles.staging_texture, &texture);
        let _ = handles.duplication.ReleaseFrame();

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        handles
            .context
            .Map(&handles.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
            .map_err(|e| CaptureError::frame_failed(format!("Map failed: {}", e)))?;

        let stride = mapped.RowPitch as usize;
        let total = stride * geometry.height as usize;
        let data = std::slice::from_raw_parts(mapped.pData as *const u8, total).to_vec();
        handles.context.Unmap(&handles.staging_texture, 0);

        Ok(RawFrame {
            width: geometry.width,
            height: geometry.height,
            stride,
            layout: PixelLayout::Bgra8,
            data,
        })
    }
}

impl CaptureBackend for DxgiBackend {
    fn method(&self) -> CaptureMethod {
        CaptureMethod::Dxgi
    }

    fn initialize(&mut self) -> Result<DisplayGeometry, CaptureError> {
        let (handles, geometry) = unsafe { Self::open(self.monitor)? };
        self.handles = Some(handles);
        self.geometry = Some(geometry);
        info!(
            "Desktop duplication opened for monitor {} ({})",
            self.monitor, geometry
        );
        Ok(geometry)
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        let (Some(handles), Some(geometry)) = (self.handles.as_ref(), self.geometry) else {
            return Err(CaptureError::frame_failed("desktop duplication not initialized"));
        };

        let result = unsafe { Self::acquire(handles, geometry, timeout) };
        if let Err(CaptureError::FrameFailed { details }) = &result {
            // Access is lost on mode changes and secure desktop switches
            debug!("Desktop duplication error, reopening: {}", details);
            self.handles = None;
            if let Ok((handles, geometry)) = unsafe { Self::open(self.monitor) } {
                self.handles = Some(handles);
                self.geometry = Some(geometry);
            }
        }
        result
    }

    fn geometry(&self) -> Option<DisplayGeometry> {
        self.geometry
    }
}
