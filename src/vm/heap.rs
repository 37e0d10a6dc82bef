use std::fmt;

use super::{ElemType, Value, VmError};

// =============================================================================
// ArrayRef - Reference to heap array
// =============================================================================

/// A non-owning reference to a heap array.
///
/// `index` selects the heap slot; `generation` is bumped every time the slot
/// is freed, so a reference to a collected array can never alias a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    pub index: u32,
    pub generation: u32,
}

impl ArrayRef {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

// =============================================================================
// ArrayObject
// =============================================================================

/// A fixed-size, homogeneous array living on the heap.
#[derive(Debug, Clone)]
pub struct ArrayObject {
    pub elem: ElemType,
    pub data: Vec<Value>,
    /// Set while a collection is in progress if the array is reachable.
    pub marked: bool,
}

impl ArrayObject {
    /// Create a zero-initialized array.
    ///
    /// Fails with `OutOfMemory` instead of aborting when the allocator
    /// cannot provide `size` elements.
    pub fn new(size: usize, elem: ElemType) -> Result<Self, VmError> {
        let zero = match elem {
            ElemType::Int => Value::Int(0),
            ElemType::Double => Value::Double(0.0),
        };
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| VmError::OutOfMemory { requested: size })?;
        data.resize(size, zero);
        Ok(Self {
            elem,
            data,
            marked: false,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Array references held by the elements, for GC tracing.
    pub fn trace(&self) -> impl Iterator<Item = ArrayRef> + '_ {
        self.data.iter().filter_map(|v| v.as_array_ref())
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self.elem, value),
            (ElemType::Int, Value::Int(_)) | (ElemType::Double, Value::Double(_))
        )
    }
}

// =============================================================================
// Heap - slab of arrays
// =============================================================================

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<ArrayObject>,
}

/// The set of live arrays.
///
/// Arrays are only ever removed by [`Heap::sweep`]; everything else hands out
/// references.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    /// Indices of empty slots available for reuse
    free: Vec<u32>,
    /// Number of live arrays
    live: usize,
    /// Total element count across live arrays
    elements: usize,
    /// Hard limit on total elements (None = unlimited)
    limit: Option<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a heap that refuses to hold more than `limit` elements in total.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Drop every array. Outstanding references become dangling.
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(i as u32);
            }
        }
        self.live = 0;
        self.elements = 0;
    }

    /// Allocate a zero-initialized array of `size` elements.
    pub fn alloc(&mut self, size: i32, elem: ElemType) -> Result<ArrayRef, VmError> {
        let size = usize::try_from(size).map_err(|_| VmError::InvalidArraySize(size))?;

        if let Some(limit) = self.limit {
            if self.elements + size > limit {
                return Err(VmError::HeapLimitExceeded {
                    requested: size,
                    limit,
                });
            }
        }

        let object = ArrayObject::new(size, elem)?;
        let r = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                ArrayRef::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ArrayRef::new(index, 0)
            }
        };

        self.live += 1;
        self.elements += size;
        Ok(r)
    }

    /// Get an array by reference.
    pub fn get(&self, r: ArrayRef) -> Option<&ArrayObject> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn get_mut(&mut self, r: ArrayRef) -> Option<&mut ArrayObject> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub fn contains(&self, r: ArrayRef) -> bool {
        self.get(r).is_some()
    }

    /// Element count of the array.
    pub fn len(&self, r: ArrayRef) -> Result<usize, VmError> {
        self.get(r)
            .map(ArrayObject::len)
            .ok_or(VmError::DanglingReference(r))
    }

    /// Read one element (a copy).
    pub fn load(&self, r: ArrayRef, index: i32) -> Result<Value, VmError> {
        let obj = self.get(r).ok_or(VmError::DanglingReference(r))?;
        usize::try_from(index)
            .ok()
            .and_then(|i| obj.data.get(i))
            .copied()
            .ok_or(VmError::IndexOutOfRange {
                index: index as i64,
                len: obj.len(),
            })
    }

    /// Overwrite one element. The value must match the array's element type.
    pub fn store(&mut self, r: ArrayRef, index: i32, value: Value) -> Result<(), VmError> {
        let obj = self.get_mut(r).ok_or(VmError::DanglingReference(r))?;
        if !obj.accepts(&value) {
            return Err(VmError::TypeMismatch {
                expected: obj.elem.name(),
                found: value.type_name(),
            });
        }
        let len = obj.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| obj.data.get_mut(i))
            .ok_or(VmError::IndexOutOfRange {
                index: index as i64,
                len,
            })?;
        *slot = value;
        Ok(())
    }

    /// Number of live arrays.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total elements across live arrays.
    pub fn element_count(&self) -> usize {
        self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live arrays.
    pub fn iter(&self) -> impl Iterator<Item = (ArrayRef, &ArrayObject)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.object
                .as_ref()
                .map(|obj| (ArrayRef::new(i as u32, slot.generation), obj))
        })
    }

    /// Mark phase: clear every flag, then mark everything reachable from `roots`.
    pub fn mark(&mut self, roots: &[Value]) {
        for obj in self.slots.iter_mut().filter_map(|s| s.object.as_mut()) {
            obj.marked = false;
        }

        let mut worklist: Vec<ArrayRef> = roots.iter().filter_map(|v| v.as_array_ref()).collect();

        while let Some(r) = worklist.pop() {
            let Some(obj) = self.get_mut(r) else {
                continue;
            };
            // Already reached: also what stops cycles once arrays can nest.
            if obj.marked {
                continue;
            }
            obj.marked = true;
            worklist.extend(obj.trace());
        }
    }

    /// Sweep phase: free every unmarked array. Returns the number freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let dead = matches!(&slot.object, Some(obj) if !obj.marked);
            if dead {
                if let Some(obj) = slot.object.take() {
                    self.elements -= obj.len();
                }
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(i as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }

    /// Perform a full collection cycle. Returns the number of arrays freed.
    pub fn collect(&mut self, roots: &[Value]) -> usize {
        self.mark(roots);
        self.sweep()
    }
}
