use slotmap::new_key_type;

new_key_type! {
    pub struct UniverseId;
    pub struct CellId;
    pub struct MaterialId;
    pub struct NuclideId;
    pub struct ReactionId;
}
