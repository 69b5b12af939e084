use kernel_alloc::{AllocError, BringUpError, InvalidArgument, MemoryManager, MemoryStatistics};
use kernel_info::boot::{Arch, MemoryDescription, MemoryMapEntry, RegionKind};
use kernel_info::memory::NODE_POOL_FRAMES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, VirtualAddress};
use kernel_trap::{FaultDispatcher, Installed, TrapError, VectorInstaller};
use kernel_vmem::{
    ActivationError, FatalReason, MappingError, MemoryKind, PhysMapper, TableNode,
    TranslationConfig, TranslationHardware,
};
use std::cell::RefCell;

const RAM: u64 = 0x4000_0000;
const RAM_SIZE: u64 = 16 * 1024 * 1024;
const KERNEL: u64 = 0x4008_0000;
const KERNEL_SIZE: u64 = 0x2_0000;
const UART: u64 = 0x0900_0000;
const HIGH: u64 = 0xFFFF_0000_0000_0000;

struct FakeVectors;

impl VectorInstaller for FakeVectors {
    fn install(&mut self) -> Result<(), TrapError> {
        Ok(())
    }
}

fn installed() -> Installed {
    FaultDispatcher::new(Arch::Aarch64, String::new())
        .install(&mut FakeVectors)
        .expect("fake vectors install")
}

fn pa(raw: u64) -> PhysicalAddress {
    PhysicalAddress::new(raw)
}

fn va(raw: u64) -> VirtualAddress {
    VirtualAddress::new(raw)
}

/// Hands out a heap-backed pool in place of the frames the allocator reserved.
struct HeapMapper {
    nodes: RefCell<Option<&'static mut [TableNode]>>,
}

impl HeapMapper {
    fn new() -> Self {
        let nodes = vec![TableNode::zeroed(); NODE_POOL_FRAMES].into_boxed_slice();
        Self {
            nodes: RefCell::new(Some(Box::leak(nodes))),
        }
    }
}

impl PhysMapper for HeapMapper {
    unsafe fn table_nodes<'a>(&self, pa: PhysicalAddress, count: usize) -> &'a mut [TableNode] {
        assert!(pa.as_u64() >= RAM && pa.as_u64() < RAM + RAM_SIZE);
        let nodes = self.nodes.borrow_mut().take().expect("pool mapped once");
        assert_eq!(nodes.len(), count);
        nodes
    }
}

fn word_at(pa: u64) -> u64 {
    pa.rotate_left(7) ^ 0x5A5A
}

#[derive(Default)]
struct SimulatedMmu {
    calls: RefCell<Vec<&'static str>>,
    invalidated: RefCell<Vec<VirtualAddress>>,
    enabled: bool,
    refuse_enable: bool,
}

impl SimulatedMmu {
    fn log(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl TranslationHardware for SimulatedMmu {
    fn configure(&mut self, _config: &TranslationConfig) {
        self.log("configure");
    }

    fn publish_table_writes(&mut self) {
        self.log("publish");
    }

    fn install_roots(&mut self, _low: PhysicalAddress, _high: PhysicalAddress) {
        self.log("install_roots");
    }

    fn enable_translation(&mut self) {
        self.log("enable");
        self.enabled = !self.refuse_enable;
    }

    fn synchronize(&mut self) {
        self.log("synchronize");
    }

    fn invalidate_all(&mut self) {
        self.log("invalidate_all");
    }

    fn invalidate_page(&mut self, va: VirtualAddress) {
        self.log("invalidate_page");
        self.invalidated.borrow_mut().push(va);
    }

    fn translation_enabled(&self) -> bool {
        self.log("translation_enabled");
        self.enabled
    }

    unsafe fn read_physical(&self, pa: PhysicalAddress) -> u64 {
        self.log("read_physical");
        word_at(pa.as_u64())
    }

    unsafe fn read_virtual(&self, va: VirtualAddress) -> u64 {
        self.log("read_virtual");
        word_at(va.as_u64() & 0x0000_7FFF_FFFF_FFFF)
    }
}

struct Machine {
    entries: [MemoryMapEntry; 2],
    devices: [PhysicalRange; 1],
}

impl Machine {
    fn qemu_virt() -> Self {
        Self {
            entries: [
                MemoryMapEntry::new(0, 0x9_F000, RegionKind::Reserved),
                MemoryMapEntry::new(RAM, RAM_SIZE, RegionKind::Available),
            ],
            devices: [PhysicalRange::new(pa(UART), 0x1000).unwrap()],
        }
    }

    fn description(&self) -> MemoryDescription<'_> {
        MemoryDescription {
            arch: Arch::Aarch64,
            regions: &self.entries,
            kernel: PhysicalRange::new(pa(KERNEL), KERNEL_SIZE).unwrap(),
            device_windows: &self.devices,
        }
    }
}

fn online(machine: &Machine) -> MemoryManager<'static, SimulatedMmu> {
    MemoryManager::bring_up(
        &installed(),
        &machine.description(),
        &HeapMapper::new(),
        SimulatedMmu::default(),
    )
    .expect("bring-up")
}

#[test]
fn bring_up_maps_kernel_ram_and_devices() {
    let machine = Machine::qemu_virt();
    let memory = online(&machine);

    assert!(memory.address_space().is_active());
    assert!(memory.capabilities().wide_copies_safe);
    assert_eq!(memory.hardware().calls().last(), Some(&"read_virtual"));

    let kernel = memory.translate(va(KERNEL + 0x1234)).unwrap();
    assert_eq!(kernel.phys, pa(KERNEL + 0x1234));
    assert!(kernel.attributes.executable);
    let kernel_alias = memory.translate(va(HIGH + KERNEL)).unwrap();
    assert_eq!(kernel_alias.phys, pa(KERNEL));
    assert!(kernel_alias.attributes.executable);

    let ram = memory.translate(va(RAM + RAM_SIZE - 0x1000)).unwrap();
    assert!(!ram.attributes.executable);
    assert_eq!(ram.attributes.kind, MemoryKind::Normal);
    let ram_alias = memory.translate(va(HIGH + RAM)).unwrap();
    assert_eq!(ram_alias.phys, pa(RAM));

    let uart = memory.translate(va(UART)).unwrap();
    assert_eq!(uart.attributes.kind, MemoryKind::Device);
    assert_eq!(memory.translate(va(HIGH + UART)), None);
    assert_eq!(memory.translate(va(RAM + RAM_SIZE)), None);
}

#[test]
fn bring_up_accounts_for_kernel_and_table_pool() {
    let machine = Machine::qemu_virt();
    let memory = online(&machine);

    let pool = memory.node_pool();
    assert_eq!(pool.count(), NODE_POOL_FRAMES);
    assert_eq!(pool.base(), pa(RAM));

    let stats = memory.memory_get_stats();
    let kernel_frames = KERNEL_SIZE / 4096;
    assert_eq!(stats.total_frames, 4096);
    assert_eq!(
        stats.allocated_frames,
        kernel_frames + NODE_POOL_FRAMES as u64
    );
    assert_eq!(stats.free_frames, stats.total_frames - stats.allocated_frames);

    let mut out = MemoryStatistics::default();
    memory.memory_get_stats_into(&mut out);
    assert_eq!(out, stats);
}

#[test]
fn byte_sized_allocations_round_to_frames() {
    let machine = Machine::qemu_virt();
    let mut memory = online(&machine);
    let before = memory.memory_get_stats();

    let buffer = memory.memory_alloc(3 * 4096 + 1).unwrap();
    assert_eq!(buffer, pa(RAM + NODE_POOL_FRAMES as u64 * 4096));
    assert_eq!(memory.memory_get_stats().allocated_frames, before.allocated_frames + 4);

    assert_eq!(
        memory.memory_free(buffer, 4096),
        Err(AllocError::InvalidArgument(InvalidArgument::RunMismatch))
    );
    memory.memory_free(buffer, 3 * 4096 + 1).unwrap();
    assert_eq!(memory.memory_get_stats(), before);

    assert_eq!(
        memory.memory_alloc(0),
        Err(InvalidArgument::ZeroCount.into())
    );
    assert_eq!(
        memory.memory_alloc(RAM_SIZE),
        Err(AllocError::OutOfMemory)
    );
}

#[test]
fn page_allocations_round_trip() {
    let machine = Machine::qemu_virt();
    let mut memory = online(&machine);

    let a = memory.memory_alloc_pages(2).unwrap();
    let b = memory.memory_alloc_pages(2).unwrap();
    assert_eq!(b.as_u64() - a.as_u64(), 0x2000);
    memory.memory_free_pages(a, 2).unwrap();
    assert_eq!(memory.memory_alloc_pages(1).unwrap(), a);
    assert_eq!(
        memory.memory_free_pages(pa(KERNEL), 1),
        Err(InvalidArgument::RunMismatch.into()),
        "the kernel image is reserved"
    );
}

#[test]
fn mapping_after_activation_publishes_and_unmapping_invalidates() {
    let machine = Machine::qemu_virt();
    let mut memory = online(&machine);
    let buffer = memory.memory_alloc_pages(2).unwrap();
    let window = va(0x0000_0010_0000_0000);

    let before = memory.hardware().calls().len();
    memory
        .memory_map(window, buffer, 0x2000, MemoryKind::Normal)
        .unwrap();
    assert_eq!(&memory.hardware().calls()[before..], ["publish", "synchronize"]);
    let t = memory.translate(va(window.as_u64() + 0x1008)).unwrap();
    assert_eq!(t.phys, pa(buffer.as_u64() + 0x1008));
    assert!(!t.attributes.executable);

    let before = memory.hardware().calls().len();
    memory.memory_unmap(window, 0x2000).unwrap();
    assert_eq!(
        &memory.hardware().calls()[before..],
        ["publish", "invalidate_page", "invalidate_page", "synchronize"]
    );
    assert_eq!(
        *memory.hardware().invalidated.borrow(),
        [window, va(window.as_u64() + 0x1000)]
    );
    assert_eq!(memory.translate(window), None);
    assert_eq!(memory.memory_unmap(window, 0x1000), Err(MappingError::NotMapped));
}

#[test]
fn facade_mappings_are_checked() {
    let machine = Machine::qemu_virt();
    let mut memory = online(&machine);
    let calls = memory.hardware().calls().len();

    assert_eq!(
        memory.memory_map(va(0x2000_0000), pa(0x2000_0000), 0x1000, MemoryKind::Normal),
        Err(MappingError::InvalidTarget)
    );
    assert_eq!(
        memory.memory_map(va(RAM), pa(RAM + 0x1000), 0x1000, MemoryKind::Normal),
        Err(MappingError::Conflict)
    );
    assert_eq!(
        memory.memory_map(va(UART), pa(UART), 0x1000, MemoryKind::Normal),
        Err(MappingError::Conflict)
    );
    assert_eq!(memory.hardware().calls().len(), calls, "failures touch no hardware");
}

#[test]
fn built_but_inactive_manager_makes_no_hardware_calls() {
    let machine = Machine::qemu_virt();
    let mut memory = MemoryManager::build(
        &installed(),
        &machine.description(),
        &HeapMapper::new(),
        SimulatedMmu::default(),
    )
    .unwrap();

    assert!(!memory.capabilities().wide_copies_safe);
    assert_eq!(memory.memory_get_stats(), memory.frames().stats());

    let page = memory.memory_alloc_pages(1).unwrap();
    memory
        .memory_map(va(0x0000_0010_0000_0000), page, 0x1000, MemoryKind::Normal)
        .unwrap();
    memory.memory_unmap(va(0x0000_0010_0000_0000), 0x1000).unwrap();
    assert!(memory.hardware().calls().is_empty());

    memory.activate().unwrap();
    assert!(memory.address_space().is_active());
}

#[test]
fn translation_that_stays_off_fails_bring_up() {
    let machine = Machine::qemu_virt();
    let mmu = SimulatedMmu {
        refuse_enable: true,
        ..SimulatedMmu::default()
    };
    let result = MemoryManager::bring_up(&installed(), &machine.description(), &HeapMapper::new(), mmu);
    assert!(matches!(
        result,
        Err(BringUpError::Activation(ActivationError::Fatal(FatalReason::NotEnabled)))
    ));
}
