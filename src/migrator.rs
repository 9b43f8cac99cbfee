use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_supplies_table::Migration),
            Box::new(m20250301_000002_create_supply_transactions_table::Migration),
            Box::new(m20250301_000003_create_audit_logs_table::Migration),
            Box::new(m20250301_000004_create_staff_profiles_table::Migration),
        ]
    }
}

mod m20250301_000001_create_supplies_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_supplies_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Supplies::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Supplies::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Supplies::Name).string().not_null())
                        .col(ColumnDef::new(Supplies::Description).string().not_null())
                        .col(ColumnDef::new(Supplies::Category).string_len(32).not_null())
                        .col(ColumnDef::new(Supplies::Manufacturer).string())
                        .col(ColumnDef::new(Supplies::ModelNumber).string())
                        .col(ColumnDef::new(Supplies::LotNumber).string())
                        .col(ColumnDef::new(Supplies::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Supplies::CurrentQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Supplies::MinimumQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Supplies::CriticalQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Supplies::Unit).string_len(32).not_null())
                        .col(ColumnDef::new(Supplies::UnitPrice).decimal())
                        .col(ColumnDef::new(Supplies::Location).string_len(32).not_null())
                        .col(ColumnDef::new(Supplies::ExpirationDate).timestamp_with_time_zone())
                        .col(ColumnDef::new(Supplies::LastRestockDate).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Supplies::LastUpdated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Supplies::IsControlled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Supplies::RequiresSignature)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Supplies::Notes).string())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_supplies_status")
                        .table(Supplies::Table)
                        .col(Supplies::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_supplies_expiration_date")
                        .table(Supplies::Table)
                        .col(Supplies::ExpirationDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Supplies::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Supplies {
        Table,
        Id,
        Name,
        Description,
        Category,
        Manufacturer,
        ModelNumber,
        LotNumber,
        Status,
        CurrentQuantity,
        MinimumQuantity,
        CriticalQuantity,
        Unit,
        UnitPrice,
        Location,
        ExpirationDate,
        LastRestockDate,
        LastUpdated,
        IsControlled,
        RequiresSignature,
        Notes,
    }
}

mod m20250301_000002_create_supply_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_supply_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplyTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplyTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyTransactions::SupplyId).uuid().not_null())
                        .col(
                            ColumnDef::new(SupplyTransactions::SupplyName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyTransactions::TransactionType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyTransactions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyTransactions::PreviousQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyTransactions::NewQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyTransactions::PerformedBy).uuid())
                        .col(
                            ColumnDef::new(SupplyTransactions::PerformedByName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyTransactions::PatientId).uuid())
                        .col(ColumnDef::new(SupplyTransactions::PatientName).string())
                        .col(ColumnDef::new(SupplyTransactions::SourceLocation).string_len(32))
                        .col(
                            ColumnDef::new(SupplyTransactions::DestinationLocation)
                                .string_len(32),
                        )
                        .col(ColumnDef::new(SupplyTransactions::Notes).string())
                        .col(ColumnDef::new(SupplyTransactions::LotNumber).string())
                        .col(
                            ColumnDef::new(SupplyTransactions::ExpirationDate)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(SupplyTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_supply_transactions_supply_id")
                        .table(SupplyTransactions::Table)
                        .col(SupplyTransactions::SupplyId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplyTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum SupplyTransactions {
        Table,
        Id,
        SupplyId,
        SupplyName,
        TransactionType,
        Quantity,
        PreviousQuantity,
        NewQuantity,
        PerformedBy,
        PerformedByName,
        PatientId,
        PatientName,
        SourceLocation,
        DestinationLocation,
        Notes,
        LotNumber,
        ExpirationDate,
        CreatedAt,
    }
}

mod m20250301_000003_create_audit_logs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_audit_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::Operation).string().not_null())
                        .col(ColumnDef::new(AuditLogs::ActorId).uuid())
                        .col(ColumnDef::new(AuditLogs::Details).json().not_null())
                        .col(ColumnDef::new(AuditLogs::Success).boolean().not_null())
                        .col(ColumnDef::new(AuditLogs::ErrorMessage).string())
                        .col(ColumnDef::new(AuditLogs::Severity).string_len(16).not_null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_audit_logs_severity_created_at")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::Severity)
                        .col(AuditLogs::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum AuditLogs {
        Table,
        Id,
        Operation,
        ActorId,
        Details,
        Success,
        ErrorMessage,
        Severity,
        CreatedAt,
    }
}

mod m20250301_000004_create_staff_profiles_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_staff_profiles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StaffProfiles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StaffProfiles::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StaffProfiles::DisplayName).string().not_null())
                        .col(ColumnDef::new(StaffProfiles::Email).string())
                        .col(ColumnDef::new(StaffProfiles::Roles).json().not_null())
                        .col(
                            ColumnDef::new(StaffProfiles::CanCheckoutSupplies)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StaffProfiles::CanManageInventory)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StaffProfiles::CanAccessControlledSubstances)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StaffProfiles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StaffProfiles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StaffProfiles::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum StaffProfiles {
        Table,
        Id,
        DisplayName,
        Email,
        Roles,
        CanCheckoutSupplies,
        CanManageInventory,
        CanAccessControlledSubstances,
        CreatedAt,
        UpdatedAt,
    }
}
