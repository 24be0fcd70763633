/// Declares a typed CRM entity together with its create and update payloads.
///
/// `crm_entity!(pub struct Contact: "contact" { first_name: String, ... })`
/// generates:
///
/// * `Contact` with private fields, getters, id and metadata,
/// * `ContactDraft` holding every field (the create payload),
/// * `ContactPatch` holding every field as `Option` (the update payload),
/// * the [`Entity`](crate::Entity) impl wiring them together.
///
/// The type must provide `fn check_draft(&ContactDraft) -> Result<()>`, run
/// on create, on every patched result and in form validation, and
/// `fn check_patch(&ContactPatch) -> Result<()>`, run before an update is
/// dispatched.
#[macro_export]
macro_rules! crm_entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $entity_type:literal {
            $( $(#[$field_meta:meta])* $field:ident : $field_ty:ty ),+ $(,)?
        }
    ) => {
        $crate::paste::paste! {
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
            $vis struct $name {
                id: $crate::EntityId,
                metadata: $crate::EntityMetadata,
                $( $(#[$field_meta])* $field: $field_ty, )+
            }

            #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
            $vis struct [<$name Draft>] {
                $( $(#[$field_meta])* pub $field: $field_ty, )+
            }

            #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
            $vis struct [<$name Patch>] {
                $( pub $field: Option<$field_ty>, )+
            }

            impl [<$name Patch>] {
                /// True when the patch changes nothing.
                pub fn is_empty(&self) -> bool {
                    true $( && self.$field.is_none() )+
                }
            }

            impl $name {
                $(
                    pub fn $field(&self) -> &$field_ty {
                        &self.$field
                    }
                )+
            }

            impl $crate::Entity for $name {
                type Draft = [<$name Draft>];
                type Patch = [<$name Patch>];

                fn entity_type() -> &'static str {
                    $entity_type
                }

                fn id(&self) -> &$crate::EntityId {
                    &self.id
                }

                fn metadata(&self) -> &$crate::EntityMetadata {
                    &self.metadata
                }

                fn metadata_mut(&mut self) -> &mut $crate::EntityMetadata {
                    &mut self.metadata
                }

                fn fields(&self) -> Vec<(String, $crate::Value)> {
                    vec![
                        $( (stringify!($field).to_string(), $crate::Value::from(self.$field.clone())), )+
                    ]
                }

                fn from_draft(
                    id: $crate::EntityId,
                    draft: Self::Draft,
                    metadata: $crate::EntityMetadata,
                ) -> $crate::Result<Self> {
                    Self::check_draft(&draft)?;
                    Ok(Self {
                        id,
                        metadata,
                        $( $field: draft.$field, )+
                    })
                }

                fn apply_patch(&mut self, patch: &Self::Patch) -> $crate::Result<bool> {
                    let mut next = self.to_draft();
                    let mut changed = false;
                    $(
                        if let Some(value) = &patch.$field {
                            if next.$field != *value {
                                next.$field = value.clone();
                                changed = true;
                            }
                        }
                    )+
                    if changed {
                        Self::check_draft(&next)?;
                        $( self.$field = next.$field; )+
                    }
                    Ok(changed)
                }

                fn to_draft(&self) -> Self::Draft {
                    [<$name Draft>] {
                        $( $field: self.$field.clone(), )+
                    }
                }

                fn patch_from_draft(draft: Self::Draft) -> Self::Patch {
                    [<$name Patch>] {
                        $( $field: Some(draft.$field), )+
                    }
                }

                fn validate_draft(draft: &Self::Draft) -> $crate::Result<()> {
                    Self::check_draft(draft)
                }

                fn validate_patch(patch: &Self::Patch) -> $crate::Result<()> {
                    if patch.is_empty() {
                        return Err($crate::SyncError::validation(
                            "update must change at least one field",
                        ));
                    }
                    Self::check_patch(patch)
                }
            }
        }
    };
}
