//! Target platform knowledge: which scalar functions have vector counterparts,
//! and which mask-reduction helpers the vectorized code needs declared.

use crate::FxIndexMap;
use std::rc::Rc;

/// A vector variant of a scalar function, processing `vector_width` lanes at once.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VectorMapping {
    pub scalar_name: Rc<str>,
    pub vector_name: Rc<str>,
    pub vector_width: u32,
}

/// Declaration of a mask-reduction helper (e.g. `rv_any`), which takes a
/// (varying) mask and returns a uniform boolean.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MaskReductionDecl {
    pub name: Rc<str>,
    pub vector_width: u32,
}

#[derive(Default)]
pub struct PlatformInfo {
    vector_mappings: FxIndexMap<(Rc<str>, u32), VectorMapping>,
    mask_reductions: FxIndexMap<Rc<str>, MaskReductionDecl>,
}

impl PlatformInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `vector_name` as the `vector_width`-wide variant of `scalar_name`
    /// (replacing any previous mapping for the same name and width).
    pub fn add_vector_mapping(&mut self, scalar_name: &str, vector_name: &str, vector_width: u32) {
        let scalar_name: Rc<str> = scalar_name.into();
        self.vector_mappings.insert(
            (scalar_name.clone(), vector_width),
            VectorMapping { scalar_name, vector_name: vector_name.into(), vector_width },
        );
    }

    pub fn vector_mapping(&self, scalar_name: &str, vector_width: u32) -> Option<&VectorMapping> {
        // FIXME(eddyb) this allocates only because of the tuple key.
        self.vector_mappings.get(&(Rc::from(scalar_name), vector_width))
    }

    pub fn is_function_vectorizable(&self, scalar_name: &str, vector_width: u32) -> bool {
        self.vector_mapping(scalar_name, vector_width).is_some()
    }

    /// Get the callee name for the mask reduction `name` (e.g. `rv_any`),
    /// declaring it on first request.
    pub fn request_mask_reduction_func(&mut self, name: &str, vector_width: u32) -> Rc<str> {
        if let Some(decl) = self.mask_reductions.get(name) {
            assert_eq!(
                decl.vector_width, vector_width,
                "platform: `{name}` was already declared for a different vector width"
            );
            return decl.name.clone();
        }
        let name: Rc<str> = name.into();
        self.mask_reductions
            .insert(name.clone(), MaskReductionDecl { name: name.clone(), vector_width });
        name
    }

    /// All the mask-reduction helpers requested so far, in request order.
    pub fn mask_reductions(&self) -> impl ExactSizeIterator<Item = &MaskReductionDecl> + '_ {
        self.mask_reductions.values()
    }
}
