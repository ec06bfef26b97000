//! Instance construction, data flow and teardown

use frt_container::builder::{BankSpec, XclbinBuilder};
use frt_driver::{
    Access, BufferRequest, Instance, PipelineState, RuntimeConfig, RuntimeError, SoftwareApi,
    StreamArg, StreamDirection,
};

const DEVICE: &str = "xilinx_u250_gen3x16_xdma_4_1";

fn vadd_image() -> bytes::Bytes {
    XclbinBuilder::new(DEVICE, "vadd")
        .buffer("a", "const int*")
        .buffer("b", "const int*")
        .buffer("c", "int*")
        .scalar("n", "int")
        .bank(BankSpec::used("DDR[0]"))
        .bank(BankSpec::used("DDR[1]"))
        .connect(0, 0)
        .connect(1, 0)
        .connect(2, 1)
        .build()
}

fn vadd_api() -> SoftwareApi {
    SoftwareApi::for_device("Xilinx", DEVICE).with_host_kernel("vadd", |inv| {
        let n: u32 = inv.scalar(3).unwrap_or(0);
        let (Some(a), Some(b)) = (inv.read(0), inv.read(1)) else {
            return;
        };
        let c: Vec<u8> = a
            .iter()
            .zip(&b)
            .take(n as usize)
            .map(|(x, y)| x.wrapping_add(*y))
            .collect();
        inv.write(2, &c);
    })
}

#[test]
fn test_vadd_round_trip() {
    let mut vm = Instance::from_bytes(vadd_api(), vadd_image(), RuntimeConfig::default()).unwrap();

    let a: Vec<u8> = (0..64).collect();
    let b = vec![100u8; 64];
    vm.create_buffer(BufferRequest::from_host(0, Access::ReadOnly, &a))
        .unwrap();
    vm.create_buffer(BufferRequest::from_host(1, Access::ReadOnly, &b))
        .unwrap();
    vm.create_buffer(BufferRequest::new(2, Access::WriteOnly, 64))
        .unwrap();
    for index in 0..3 {
        vm.set_buffer_arg(index).unwrap();
    }
    vm.set_scalar_arg(3, 64u32).unwrap();

    let metrics = vm.invoke().unwrap();
    assert_eq!(metrics.load.bytes, 128);
    assert_eq!(metrics.store.bytes, 64);
    assert!(metrics.span_ns() >= metrics.compute.elapsed_ns());
    assert_eq!(vm.state(), PipelineState::Idle);

    let expected: Vec<u8> = (100..164).collect();
    assert_eq!(vm.host_data(2).unwrap(), &expected[..]);

    vm.host_data_mut(0).unwrap().fill(1);
    vm.invoke().unwrap();
    assert!(vm.host_data(2).unwrap().iter().all(|&x| x == 101));
}

#[test]
fn test_buffer_arg_requires_buffer() {
    let mut vm = Instance::from_bytes(vadd_api(), vadd_image(), RuntimeConfig::default()).unwrap();
    assert!(matches!(
        vm.set_buffer_arg(0),
        Err(RuntimeError::UnknownArgument { index: 0 })
    ));
    assert!(matches!(
        vm.host_data(2),
        Err(RuntimeError::UnknownArgument { index: 2 })
    ));
}

#[test]
fn test_teardown_releases_everything() {
    let mut api = vadd_api();
    {
        let mut vm = Instance::from_bytes(&mut api, vadd_image(), RuntimeConfig::default()).unwrap();
        vm.create_buffer(BufferRequest::new(0, Access::ReadOnly, 32))
            .unwrap();
        vm.create_buffer(BufferRequest::new(2, Access::WriteOnly, 32))
            .unwrap();
        vm.create_buffer(BufferRequest::new(2, Access::WriteOnly, 64))
            .unwrap();
        assert_eq!(vm.api().buffer_count(), 2);
    }
    assert_eq!(api.buffer_count(), 0);
    assert_eq!(api.context_count(), 0);
}

#[test]
fn test_stream_argument() {
    let image = XclbinBuilder::new(DEVICE, "krnl_stream")
        .stream("in", "stream<int>")
        .stream("out", "stream<int>")
        .build();
    let mut vm = Instance::from_bytes(
        SoftwareApi::for_device("Xilinx", DEVICE),
        image,
        RuntimeConfig::default(),
    )
    .unwrap();

    let mut input = StreamArg::new();
    assert!(input.handle().is_none());
    vm.set_stream_arg(0, StreamDirection::Write, &mut input)
        .unwrap();

    let handle = input.handle().expect("attached");
    let (kernel, index, direction) = vm.api().stream_binding(handle).unwrap();
    assert_eq!(kernel, vm.device().kernel);
    assert_eq!(index, 0);
    assert_eq!(direction, StreamDirection::Write);
}

#[test]
fn test_open_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vadd.xclbin");
    std::fs::write(&path, vadd_image()).unwrap();

    let vm = Instance::open(vadd_api(), &path, RuntimeConfig::default()).unwrap();
    assert_eq!(vm.kernel_name(), "vadd");
    assert_eq!(vm.args().len(), 4);
    assert_eq!(vm.device().device_name, DEVICE);

    let missing = Instance::open(
        vadd_api(),
        dir.path().join("missing.xclbin"),
        RuntimeConfig::default(),
    );
    assert!(matches!(missing, Err(RuntimeError::Container(_))));
}

#[test]
fn test_without_forced_host_ptr() {
    let config = RuntimeConfig::default().with_force_host_ptr(false);
    let mut vm = Instance::from_bytes(vadd_api(), vadd_image(), config).unwrap();
    let handle = vm
        .create_buffer(BufferRequest::new(0, Access::ReadOnly, 16))
        .unwrap();
    let flags = vm.api().allocation(handle).unwrap().flags;
    assert!(!flags.contains(frt_driver::MemFlags::USE_HOST_PTR));
    assert!(flags.contains(frt_driver::MemFlags::EXT_PTR_XILINX));
}
