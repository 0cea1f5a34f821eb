//! Device upload path for flattened offload requests.
//!
//! Stands in for page-locked host memory: staging buffers are created
//! mapped, filled from the request's `Pod` bytes, and unmapped, so the
//! device copy can run asynchronously while the walk keeps accumulating the
//! next batch. The device and queue belong to the external dispatcher; this
//! module never initializes an adapter.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::offload::OffloadRequest;

/// Device-side buffers for one offload request.
pub struct GpuRequestBuffers {
    /// Concatenated interaction records.
    pub records: wgpu::Buffer,
    /// Per-bucket slice markers (with trailing sentinel).
    pub bucket_markers: wgpu::Buffer,
    /// Per-bucket starts into the owning particle array.
    pub bucket_starts: wgpu::Buffer,
    /// Per-bucket sizes in the owning particle array.
    pub bucket_sizes: wgpu::Buffer,
}

/// Upload a flattened request into storage buffers.
///
/// The dispatcher must skip empty requests; a zero-length buffer is not
/// representable on the device.
pub fn upload_request<T: Pod>(
    device: &wgpu::Device,
    request: &OffloadRequest<T>,
    label: &str,
) -> GpuRequestBuffers {
    assert!(
        !request.is_empty(),
        "empty offload requests are skipped, not uploaded"
    );
    let records = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: request.as_bytes(),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    });
    let bucket_markers = create_u32_buffer(device, &request.bucket_markers, label);
    let bucket_starts = create_u32_buffer(device, &request.bucket_starts, label);
    let bucket_sizes = create_u32_buffer(device, &request.bucket_sizes, label);
    GpuRequestBuffers {
        records,
        bucket_markers,
        bucket_starts,
        bucket_sizes,
    }
}

fn create_u32_buffer(device: &wgpu::Device, data: &[u32], label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    })
}

/// Create a staging buffer of `size` bytes, mapped for writing.
pub fn create_staging_buffer(device: &wgpu::Device, size: usize, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as u64,
        usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: true,
    })
}

/// Write `records` into a staging buffer created by
/// [`create_staging_buffer`] and unmap it for the device copy.
pub fn write_staging<T: Pod>(staging: &wgpu::Buffer, records: &[T]) {
    let bytes: &[u8] = bytemuck::cast_slice(records);
    {
        let mut view = staging.slice(..).get_mapped_range_mut();
        view[..bytes.len()].copy_from_slice(bytes);
    }
    staging.unmap();
}
