//! The memory manager context
//!
//! One [`MemoryManager`] owns physical memory access and every piece of
//! allocator state. It is built once at boot and every mutating operation
//! takes `&mut self`: the borrow checker is the lock on a single core, and
//! [`LockedMemory`](crate::LockedMemory) is the lock across cores.

use crate::error::MemoryError;
use crate::heap::HeapAllocator;
use crate::page_alloc::PageAllocator;
use kernel_info::boot::{BootParams, RamLayout};
use kernel_registers::ContextSource;
use kernel_vmem::addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_vmem::{
    AddressSpace, AddressTranslator, MapError, PageEntryBits, PhysMemory, TranslationError,
    direct_map_to_physical,
};

/// Address translation, page allocation and the heap over one RAM extent.
#[derive(Debug)]
pub struct MemoryManager<M> {
    mem: M,
    translator: AddressTranslator,
    pages: PageAllocator,
    heap: HeapAllocator,
}

impl<M: PhysMemory> MemoryManager<M> {
    /// Set up the page allocator and an empty heap over `layout`.
    ///
    /// # Errors
    /// [`MemoryError::RamTooSmall`] if nothing would be left to allocate.
    pub fn new(mut mem: M, layout: RamLayout) -> Result<Self, MemoryError> {
        let pages = PageAllocator::new(&mut mem, layout)?;
        Ok(Self {
            mem,
            translator: AddressTranslator::new(layout.ram),
            pages,
            heap: HeapAllocator::new(),
        })
    }

    /// Initialize from the boot parameter block, using its first RAM device.
    ///
    /// # Errors
    /// [`MemoryError::NoRam`] if the device table lists no RAM, otherwise as
    /// [`new`](Self::new).
    pub fn from_boot_params(mem: M, params: &BootParams) -> Result<Self, MemoryError> {
        let layout = params.ram_layout().ok_or(MemoryError::NoRam)?;
        Self::new(mem, layout)
    }

    #[must_use]
    pub const fn layout(&self) -> RamLayout {
        self.pages.layout()
    }

    #[must_use]
    pub const fn pages(&self) -> &PageAllocator {
        &self.pages
    }

    #[must_use]
    pub const fn heap(&self) -> &HeapAllocator {
        &self.heap
    }

    #[must_use]
    pub const fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.mem
    }

    /// Raw access to physical memory, bypassing all allocator bookkeeping.
    pub const fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn into_memory(self) -> M {
        self.mem
    }

    /// See [`PageAllocator::alloc_pages`].
    ///
    /// # Errors
    /// As [`PageAllocator::alloc_pages`].
    pub fn alloc_pages(&mut self, count: u32) -> Result<VirtualAddress, MemoryError> {
        self.pages.alloc_pages(&mut self.mem, count)
    }

    /// See [`PageAllocator::calloc_pages`].
    ///
    /// # Errors
    /// As [`PageAllocator::alloc_pages`].
    pub fn calloc_pages(&mut self, count: u32) -> Result<VirtualAddress, MemoryError> {
        self.pages.calloc_pages(&mut self.mem, count)
    }

    /// See [`PageAllocator::free_pages`].
    ///
    /// # Errors
    /// As [`PageAllocator::free_pages`].
    pub fn free_pages(&mut self, address: VirtualAddress, count: u32) -> Result<(), MemoryError> {
        self.pages.free_pages(&mut self.mem, address, count)
    }

    /// See [`HeapAllocator::malloc`].
    ///
    /// # Errors
    /// As [`HeapAllocator::malloc`].
    pub fn malloc(&mut self, size: u32) -> Result<VirtualAddress, MemoryError> {
        self.heap.malloc(&mut self.mem, &mut self.pages, size)
    }

    /// See [`HeapAllocator::calloc`].
    ///
    /// # Errors
    /// As [`HeapAllocator::calloc`].
    pub fn calloc(&mut self, size: u32, count: u32) -> Result<VirtualAddress, MemoryError> {
        self.heap.calloc(&mut self.mem, &mut self.pages, size, count)
    }

    /// See [`HeapAllocator::free`].
    ///
    /// # Errors
    /// As [`HeapAllocator::free`].
    pub fn free(&mut self, pointer: VirtualAddress) -> Result<(), MemoryError> {
        self.heap.free(&mut self.mem, &mut self.pages, pointer)
    }

    #[must_use]
    pub const fn physical_to_virtual(&self, pa: PhysicalAddress) -> VirtualAddress {
        self.translator.physical_to_virtual(pa)
    }

    /// Translate `va` using the page tables named by `ctx`.
    ///
    /// # Errors
    /// A [`TranslationError`] if `va` is not mapped. This is not fatal.
    pub fn virtual_to_physical<C: ContextSource + ?Sized>(
        &self,
        ctx: &C,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, TranslationError> {
        self.translator.virtual_to_physical(&self.mem, ctx, va)
    }

    /// Copy from direct-mapped RAM at `address` into `buf`.
    ///
    /// # Errors
    /// [`MemoryError::OutsideRam`] unless the whole range is direct-mapped RAM.
    pub fn read_bytes(&self, address: VirtualAddress, buf: &mut [u8]) -> Result<(), MemoryError> {
        let pa = self.ram_range(address, buf.len())?;
        self.mem.read_bytes(pa, buf);
        Ok(())
    }

    /// Copy `data` to direct-mapped RAM at `address`.
    ///
    /// # Errors
    /// [`MemoryError::OutsideRam`] unless the whole range is direct-mapped RAM.
    pub fn write_bytes(&mut self, address: VirtualAddress, data: &[u8]) -> Result<(), MemoryError> {
        let pa = self.ram_range(address, data.len())?;
        self.mem.write_bytes(pa, data);
        Ok(())
    }

    /// Set `len` bytes of direct-mapped RAM at `address` to `byte`.
    ///
    /// # Errors
    /// [`MemoryError::OutsideRam`] unless the whole range is direct-mapped RAM.
    pub fn fill(&mut self, address: VirtualAddress, len: u32, byte: u8) -> Result<(), MemoryError> {
        let pa = self.ram_range(address, len as usize)?;
        self.mem.fill(pa, len, byte);
        Ok(())
    }

    fn ram_range(&self, address: VirtualAddress, len: usize) -> Result<PhysicalAddress, MemoryError> {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        let error = MemoryError::OutsideRam { address, len };
        let ram = self.layout().ram;
        let pa = direct_map_to_physical(address).ok_or(error)?;
        let inside = pa
            .as_u32()
            .checked_sub(ram.start().base().as_u32())
            .and_then(|offset| offset.checked_add(len))
            .is_some_and(|end| end <= ram.len() * PAGE_SIZE);
        if inside { Ok(pa) } else { Err(error) }
    }

    /// A new, empty address space whose page directory comes from the page allocator.
    pub fn create_address_space(&mut self) -> Option<AddressSpace> {
        AddressSpace::create(&mut self.mem, &mut self.pages)
    }

    /// Map one page in `space`, taking any new page table from the page allocator.
    ///
    /// # Errors
    /// As [`AddressSpace::map_page`].
    pub fn map_page(
        &mut self,
        space: &AddressSpace,
        va: VirtualAddress,
        page: PhysicalPage,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        space.map_page(&mut self.mem, &mut self.pages, va, page, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::boot::{DeviceTableEntry, DeviceType};
    use kernel_vmem::SimulatedRam;

    fn manager() -> MemoryManager<SimulatedRam> {
        let layout = RamLayout::from_page_numbers(4, 4 + 64, 2);
        MemoryManager::new(SimulatedRam::new(layout.ram), layout).unwrap()
    }

    #[test]
    fn from_boot_params_uses_first_ram_device() {
        let mut params = BootParams::empty();
        params.bootpages = 3;
        params.devtable[1] = DeviceTableEntry {
            kind: DeviceType::Ram as u32,
            model: 0,
            start: 0x4000,
            end: 0x4_4000,
        };
        let ram = SimulatedRam::from_page_numbers(4, 0x44);
        let mm = MemoryManager::from_boot_params(ram, &params).unwrap();
        assert_eq!(mm.layout(), RamLayout::from_page_numbers(4, 0x44, 3));
        assert_eq!(mm.pages().pages_reserved(), 4);
    }

    #[test]
    fn from_boot_params_without_ram() {
        let ram = SimulatedRam::from_page_numbers(4, 8);
        assert_eq!(
            MemoryManager::from_boot_params(ram, &BootParams::empty()).unwrap_err(),
            MemoryError::NoRam
        );
    }

    #[test]
    fn bytes_through_the_direct_map() {
        let mut mm = manager();
        let p = mm.malloc(5).unwrap();
        mm.write_bytes(p, b"hello").unwrap();
        let mut buf = [0u8; 5];
        mm.read_bytes(p, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        let end = VirtualAddress::new(0xC004_3FFE);
        assert_eq!(
            mm.write_bytes(end, b"abc"),
            Err(MemoryError::OutsideRam {
                address: end,
                len: 3
            })
        );
        assert!(mm.read_bytes(VirtualAddress::new(0x4000), &mut buf).is_err());
    }

    #[test]
    fn mapped_pages_translate_through_context() {
        let mut mm = manager();
        let space = mm.create_address_space().unwrap();
        let page = direct_map_to_physical(mm.calloc_pages(1).unwrap())
            .unwrap()
            .page();
        let va = VirtualAddress::new(0x0800_0000);
        mm.map_page(&space, va + 0x10, page, PageEntryBits::new_kernel_rw())
            .unwrap();

        assert_eq!(
            mm.virtual_to_physical(&space.context(), va + 0x10),
            Ok(page.base() + 0x10)
        );
        assert_eq!(
            mm.virtual_to_physical(&space.context(), va + 0x1000),
            Err(TranslationError::TableEntryInvalid { va: va + 0x1000 })
        );
        // Directory, table and the data page.
        assert_eq!(
            mm.pages().free_page_count(mm.memory()),
            mm.pages().allocatable_pages() - 3
        );
    }
}
